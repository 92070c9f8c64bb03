//! Fleet Demo - end-to-end delivery walkthrough.
//!
//! 1. Register the user and the drone
//! 2. Create a delivery task for the drone
//! 3. Assign it (task and drone go ongoing)
//! 4. Report the drone landed (task completes, drone is released)
//!
//! Usage:
//!   cargo run -p fleet-cli --bin fleet_demo -- --url http://localhost:3000

use anyhow::{bail, Context, Result};
use clap::Parser;
use fleet_core::{
    Coordinate, CreateTaskRequest, Drone, ErrorKind, FlightStatus, TaskStatus, Telemetry, User,
    Velocity,
};
use fleet_sdk::FleetClient;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the delivery demo against a fleet server")]
struct Args {
    /// Fleet server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Owner name
    #[arg(long, default_value = "Alice")]
    user: String,

    /// Drone hardware id
    #[arg(long, default_value = "ABC123")]
    hardware_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = FleetClient::new(args.url.clone());

    if !client.health().await.unwrap_or(false) {
        bail!("fleet server at {} is not reachable", args.url);
    }

    println!("=== Fleet Demo ===");
    let user = ensure_user(&client, &args.user).await?;
    println!("User:  {} (id {})", user.name, user.id);

    let drone = ensure_drone(&client, &args.hardware_id, &user).await?;
    println!(
        "Drone: {} (id {}, {})",
        drone.hardware_id, drone.id, drone.flight_status
    );

    let task = client
        .create_task(&CreateTaskRequest {
            user_id: user.id,
            drone_id: drone.id,
            start: Coordinate::new(0.0, 0.0),
            end: Coordinate::new(1.0, 1.0),
            description: "demo delivery".to_string(),
        })
        .await
        .context("create task")?;
    println!("Task:  {} created ({})", task.id, task.status);

    let task = client.assign_task(task.id).await.context("assign task")?;
    let drone = client.get_drone(drone.id).await?;
    println!(
        "Assigned: task {} -> {}, drone {} -> {}",
        task.id, task.status, drone.id, drone.flight_status
    );

    let landed = Telemetry {
        velocity: Velocity::default(),
        gps: task.end,
        altitude_m: 0.0,
        battery: 80,
        status: FlightStatus::Completed,
    };
    let drone = client
        .send_telemetry(drone.id, &landed)
        .await
        .context("send landing telemetry")?;
    let task = client.get_task(task.id).await?;
    println!(
        "Landed:   task {} -> {}, drone {} -> {} (current task: {})",
        task.id,
        task.status,
        drone.id,
        drone.flight_status,
        drone
            .current_task_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    if task.status != TaskStatus::Completed || drone.current_task_id.is_some() {
        bail!("delivery did not finish cleanly");
    }

    let completed = client.tasks_by_status(TaskStatus::Completed).await?;
    println!("Completed tasks on server: {}", completed.len());
    println!("=== Demo finished ===");
    Ok(())
}

async fn ensure_user(client: &FleetClient, name: &str) -> Result<User> {
    let existing = client.list_users().await?;
    if let Some(user) = existing.into_iter().find(|u| u.name == name.trim()) {
        return Ok(user);
    }
    Ok(client.create_user(name).await.context("create user")?)
}

async fn ensure_drone(client: &FleetClient, hardware_id: &str, owner: &User) -> Result<Drone> {
    match client.create_drone(hardware_id, Some(owner.id)).await {
        Ok(drone) => Ok(drone),
        Err(e) if e.kind() == Some(ErrorKind::Conflict) => {
            let drone = client
                .list_drones()
                .await?
                .into_iter()
                .find(|d| d.hardware_id == hardware_id.trim())
                .context("drone conflict but hardware id not listed")?;
            if drone.is_flying() {
                bail!("drone {} is already flying", drone.hardware_id);
            }
            Ok(drone)
        }
        Err(e) => Err(e).context("create drone"),
    }
}
