// crates/client/examples/simple_request.rs
//! Simple request example showing basic usage

use tether_client::{Connection, ConnectivityState, Method, ResponseType};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("🌐 Simple Request Example\n");

    let connection = Connection::new()?;
    connection
        .reachability()
        .report(ConnectivityState::Reachable);

    println!("Requesting https://httpbin.org/json...\n");

    match connection
        .send_request(
            "https://httpbin.org/json",
            Method::Get,
            None,
            ResponseType::Json,
            None,
        )
        .await
    {
        Ok(body) => {
            println!("✅ Response decoded as JSON:\n");
            if let Some(value) = body.as_json() {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
        }
        Err(e) => {
            eprintln!("❌ Request failed: {}", e);
        }
    }

    Ok(())
}
