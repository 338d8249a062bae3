//! Try-on example - dresses a body photo in a clothing photo.
//!
//! Run with: `cargo run --example try_on -- <body.jpg> <clothing.jpg> [output.png]`
//!
//! Requires `TRYON_API_URL`. Set `TRYON_UPLOAD=1` for backends that expect
//! uploaded files, and `RUST_LOG=tryon=debug` to follow the job.

use tracing_subscriber::EnvFilter;
use tryon::{
    ClientConfig, GenerationParams, ImageAsset, ProtocolVariant, TryOnClient, TryOnOutcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(body_path), Some(clothing_path)) = (args.next(), args.next()) else {
        anyhow::bail!("Usage: try_on <body.jpg> <clothing.jpg> [output.png]");
    };
    let output = args.next();

    let body = ImageAsset::from_bytes(std::fs::read(&body_path)?, body_path.as_str());
    let clothing = ImageAsset::from_bytes(std::fs::read(&clothing_path)?, clothing_path.as_str());

    let variant = if std::env::var("TRYON_UPLOAD").is_ok_and(|v| v == "1") {
        ProtocolVariant::UploadReference(GenerationParams::default())
    } else {
        ProtocolVariant::InlineData
    };
    let client = TryOnClient::new(ClientConfig::builder().variant(variant).build()?)?;

    match client.submit_with_fallback(&body, &clothing).await {
        TryOnOutcome::Completed(image) => {
            let ext = image.format.map_or("png", |f| f.extension());
            let path = output.unwrap_or_else(|| format!("tryon.{ext}"));
            std::fs::write(&path, &image.data)?;
            println!(
                "Saved {} ({} bytes, {:.1}s via {})",
                path,
                image.size(),
                image.metadata.duration.as_secs_f64(),
                image.metadata.endpoint
            );
        }
        TryOnOutcome::Failed(e) => {
            anyhow::bail!("try-on failed ({:?}): {e}", e.category());
        }
        TryOnOutcome::Idle | TryOnOutcome::InProgress => unreachable!("submit returns a terminal outcome"),
    }

    Ok(())
}
