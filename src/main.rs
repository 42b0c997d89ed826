use autoapi::Settings;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autoapi=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    if let Err(e) = autoapi::run(settings) {
        tracing::error!(error = %e, "startup failed");
        return Err(e.into());
    }
    Ok(())
}
