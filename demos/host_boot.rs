//! Simulated page boot: the game client publishes its model after a delay while
//! three userscripts wait on one shared waiter.
//!
//! Run with: RUST_LOG=debug cargo run --example host_boot

use ika_model_wait::readiness::{AddedNode, ChangeBatch, DocumentFeed, HostGlobal};
use ika_model_wait::{ModelReadinessWaiter, WaiterConfig};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct City {
    id: u32,
    name: String,
}

#[derive(Debug)]
struct GameModel {
    cities: Vec<City>,
    selected_city: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let global: Arc<HostGlobal<GameModel>> = Arc::new(HostGlobal::new());
    let document = DocumentFeed::new();

    let waiter = ModelReadinessWaiter::<Arc<GameModel>>::builder()
        .config(WaiterConfig::default().with_env_overrides()?)
        .probe_arc(global.clone())
        .change_source(document.clone())
        .build()?;

    let mut scripts = Vec::new();
    for name in ["navigation-enhancer", "map-enhancer", "check-island-slots"] {
        let waiter = waiter.clone();
        scripts.push(tokio::spawn(async move {
            match waiter.wait_for_ready().await {
                Ok(model) => println!(
                    "{}: ready with {} cities, selected {}",
                    name,
                    model.cities.len(),
                    model.selected_city
                ),
                Err(e) => eprintln!("{}: {}", name, e),
            }
        }));
    }

    // the client bundle loads, half-builds the global, then finishes
    tokio::time::sleep(Duration::from_millis(400)).await;
    global.set_initializing("Cannot read properties of undefined (reading 'relatedCityData')");
    document.publish(&ChangeBatch::new(vec![AddedNode::script("/js/ikariam.js")]));

    tokio::time::sleep(Duration::from_millis(600)).await;
    global.publish(GameModel {
        cities: vec![
            City {
                id: 101,
                name: "Polis".to_string(),
            },
            City {
                id: 102,
                name: "Chraestios".to_string(),
            },
        ],
        selected_city: 101,
    });
    document.publish(&ChangeBatch::new(vec![AddedNode::script("/js/model-init.js")]));

    for script in scripts {
        script.await?;
    }

    let names = waiter.when_ready(|model| {
        Ok(model
            .cities
            .iter()
            .map(|c| format!("{}#{}", c.name, c.id))
            .collect::<Vec<_>>())
    });
    println!("cities: {:?}", names.await?);
    println!("{:?}", waiter.snapshot());
    Ok(())
}
