use anyhow::{Context, Result};
use tracing::info;

use aws_health_checks::aws;
use aws_health_checks::config::{load_config, Ec2Metadata};
use aws_health_checks::runner::CheckRunner;
use aws_health_checks::sink::DogstatsdSink;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let path = std::env::args().nth(1).unwrap_or_else(|| "checks.toml".to_string());
    let cfg = load_config(&path).with_context(|| format!("loading {}", path))?;
    info!(
        elb = cfg.elb.len(),
        redshift = cfg.redshift.len(),
        "loaded check configuration"
    );

    let sink = DogstatsdSink::new(cfg.init_config.statsd_address())
        .with_context(|| format!("binding dogstatsd sink for {}", cfg.init_config.statsd_address()))?;
    let metadata = Ec2Metadata::new();
    let runner = CheckRunner::new(&sink, &cfg.init_config, &metadata);

    runner.run_all(&aws::elb_check(), &cfg.elb).await;
    runner.run_all(&aws::redshift_check(), &cfg.redshift).await;

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
