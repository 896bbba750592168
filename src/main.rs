use anyhow::{Context, ensure};
use serde_json::{Value, json};

use multiproc::config::DispatchConfig;
use multiproc::worker::{Callable, Dispatcher, FailureKind, Job, TaskFailure};

/// A car that drives, shows off, and gets stuck in traffic.
#[derive(Debug, Clone)]
struct Car {
    brand: String,
    color: String,
}

impl Car {
    fn new(brand: &str, color: &str) -> Self {
        Self {
            brand: brand.to_string(),
            color: color.to_string(),
        }
    }

    fn drive(&self) -> Callable {
        let brand = self.brand.clone();
        Callable::new("drive", move |args| {
            let distance = args.first().and_then(Value::as_f64).unwrap_or_default();
            let speed = args.get(1).and_then(Value::as_f64).unwrap_or(1.0);
            if speed <= 0.0 {
                return Err(TaskFailure::invalid_argument("speed must be positive"));
            }
            Ok(json!({ "brand": brand, "hours": distance / speed }))
        })
    }

    fn show_off(&self) -> Callable {
        let label = format!("{} {}", self.color, self.brand);
        Callable::new("show_off", move |_| Ok(json!(format!("Yeaaah! ({label})"))))
    }

    fn stuck_in_traffic_jam(&self) -> Callable {
        let brand = self.brand.clone();
        Callable::new("stuck_in_traffic_jam", move |_| {
            Err(TaskFailure::overflow(format!("{brand} is stuck in a jam")))
        })
    }

    fn honk_and_curse(&self) -> Callable {
        Callable::new("honk_and_curse", |_| Ok(json!("BEEEP!!!!!")))
    }
}

fn build_jobs() -> multiproc::error::Result<Vec<Job>> {
    let cars = [
        Car::new("Volkswagen", "grey"),
        Car::new("Mercedes", "black"),
        Car::new("Audi", "white"),
    ];

    cars.iter()
        .map(|car| -> multiproc::error::Result<Job> {
            let mut job = Job::labeled(car.brand.clone());
            job.append_normal_task(car.drive(), vec![json!(10), json!(20)]);
            job.append_normal_task(car.show_off(), Vec::new());
            job.append_normal_task(car.stuck_in_traffic_jam(), Vec::new());
            job.append_exception_to_catch(FailureKind::Overflow)?;
            job.append_forgiveness_task(car.honk_and_curse(), Vec::new());
            Ok(job)
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = DispatchConfig::from_env().context("Failed to read dispatch configuration")?;
    eprintln!("multiproc v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Parallelize: {}, workers: {}",
        config.parallelize,
        if config.worker_count == 0 {
            "all".to_string()
        } else {
            config.worker_count.to_string()
        }
    );

    let dispatcher = Dispatcher::new();
    let jobs = build_jobs()?;

    let configured = dispatcher
        .run_with_config(jobs.clone(), &config)
        .await
        .context("Configured run failed")?;
    let sequential = dispatcher
        .run_with_config(jobs, &DispatchConfig::sequential())
        .await
        .context("Sequential run failed")?;

    ensure!(
        configured.len() == sequential.len()
            && configured
                .iter()
                .zip(&sequential)
                .all(|(a, b)| a.results_match(b)),
        "configured and sequential runs disagree"
    );

    println!("{}", serde_json::to_string_pretty(&configured)?);
    Ok(())
}
