//! Fly an existing task and stream its telemetry.
//!
//! Assigns the task (unless it is already ongoing), then reports samples along
//! the straight line from the task's start to its end and finally lands.
//!
//! Usage:
//!   cargo run -p fleet-cli --bin send_telemetry -- --task 1

use anyhow::{bail, Context, Result};
use clap::Parser;
use fleet_core::{FlightStatus, TaskId, TaskStatus};
use fleet_cli::args::positive_f64;
use fleet_cli::DeliveryFlight;
use fleet_sdk::FleetClient;
use tokio::time::{interval, Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fleet server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Task to fly
    #[arg(long)]
    task: i64,

    /// Update rate in Hz
    #[arg(long, default_value_t = 2.0, value_parser = positive_f64)]
    rate: f64,

    /// Cruise speed in m/s
    #[arg(long, default_value_t = 15.0, value_parser = positive_f64)]
    speed: f64,

    /// Cruise altitude in metres
    #[arg(long, default_value_t = 50.0)]
    altitude: f64,

    /// Simulated seconds per wall-clock second
    #[arg(long, default_value_t = 60.0, value_parser = positive_f64)]
    time_scale: f64,

    /// Report an aborted flight at this fraction of the route instead of landing
    #[arg(long)]
    abort_at: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = FleetClient::new(args.url);

    let task_id = TaskId::from(args.task);
    let mut task = client.get_task(task_id).await.context("fetch task")?;
    if task.status == TaskStatus::Waiting {
        println!("Assigning task {}...", task.id);
        task = client.assign_task(task.id).await.context("assign task")?;
    }
    if task.status != TaskStatus::Ongoing {
        bail!("task {} is {}, nothing to fly", task.id, task.status);
    }
    let drone = client.get_drone(task.drone_id).await?;
    println!("Drone {} ({}) flying task {}", drone.id, drone.hardware_id, task.id);

    let flight = DeliveryFlight::new(task.start, task.end, args.altitude, args.speed)
        .with_battery(drone.battery);
    let abort_after = args
        .abort_at
        .map(|fraction| flight.duration_secs() * fraction.clamp(0.0, 1.0));
    println!(
        "Distance: {:.0}m, Heading: {:.0}deg, Duration: {:.0}s",
        flight.distance_m(),
        flight.heading_deg(),
        flight.duration_secs()
    );

    let step = args.time_scale / args.rate;
    let mut ticker = interval(Duration::from_secs_f64(1.0 / args.rate));
    let mut elapsed = 0.0;
    let mut sent = 0u64;

    loop {
        ticker.tick().await;

        let mut telemetry = flight.sample(elapsed);
        if abort_after.is_some_and(|limit| elapsed >= limit) {
            telemetry.status = FlightStatus::Aborted;
        }

        match client.send_telemetry(drone.id, &telemetry).await {
            Ok(state) => {
                sent += 1;
                if sent % 10 == 1 || !state.is_flying() {
                    println!(
                        "t={:>6.0}s {:.5}, {:.5} alt {:>5.1}m battery {:>3}% -> {}",
                        elapsed,
                        telemetry.gps.lat,
                        telemetry.gps.lon,
                        telemetry.altitude_m,
                        telemetry.battery,
                        state.flight_status
                    );
                }
                if !state.is_flying() {
                    break;
                }
            }
            Err(e) if e.is_retryable() => eprintln!("Telemetry rejected, retrying: {}", e),
            Err(e) => return Err(e).context("send telemetry"),
        }

        elapsed += step;
    }

    let task = client.get_task(task.id).await?;
    println!("Flight over after {} samples. Task {} is {}", sent, task.id, task.status);
    Ok(())
}
