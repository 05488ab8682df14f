// crates/client/examples/resilient_download.rs
//! Download example with a reachability probe and loss/restore callbacks

use std::sync::Arc;
use tether_client::{Connection, ConnectionConfig, ProbeConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("📥 Resilient Download Example\n");

    let connection = Connection::with_callbacks(
        ConnectionConfig::default(),
        Some(Arc::new(|| println!("\n⚠️  Connectivity lost, download paused..."))),
        Some(Arc::new(|| println!("\n🔁 Connectivity restored, resuming..."))),
    )?;

    // Probe well-known hosts so the connection knows when the network
    // comes and goes
    let _probe = connection.spawn_probe(ProbeConfig::default());

    let temp_dir = tempfile::tempdir()?;
    let destination = temp_dir.path().join("robots.txt");

    println!("Downloading https://www.rust-lang.org/robots.txt...\n");

    match connection
        .download_file(
            "https://www.rust-lang.org/robots.txt",
            &destination,
            Some(Arc::new(|progress| {
                print!(
                    "\r Progress: {} bytes ({}%)",
                    progress.transferred_bytes,
                    progress.percentage()
                );
                std::io::Write::flush(&mut std::io::stdout()).ok();
            })),
        )
        .await
    {
        Ok(bytes) => {
            println!("\n\n✅ Download complete: {} bytes", bytes);
            let content = std::fs::read_to_string(&destination)?;
            for (i, line) in content.lines().take(5).enumerate() {
                println!("  {}: {}", i + 1, line);
            }
        }
        Err(e) => {
            eprintln!("\n❌ Download failed: {}", e);
        }
    }

    // Fetch again only if it changed since the first download
    let modified = connection
        .download_file_with_conditional_control(
            "https://www.rust-lang.org/robots.txt",
            &destination,
            None,
        )
        .await?;
    println!(
        "\n🔎 Conditional refetch: {}",
        if modified { "content changed" } else { "not modified" }
    );

    Ok(())
}
