//! Example walking a profile file through parsing, compilation and resolution
//!
//! Run with: cargo run --package balancer-core --example profile_demo

use balancer_core::domain::{
    Adjustment, BalanceResolver, ChannelSnapshot, CompiledProfile, ProfileStore,
};

const PROFILES: &str = r#"
balance_profiles:
  - movie:
      - "100% ^front-(left|right)$"
      - "120% center"
      - "50% lfe"
      - "70% rear"
  - night:
      - "100% front"
      - "0% lfe"
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("balancer_core=debug,info")
        .init();

    println!("=== Balancer Profile Demo ===\n");

    let store = ProfileStore::parse(PROFILES)?;
    println!("Loaded {} profiles: {:?}", store.len(), store.names().collect::<Vec<_>>());

    let sink = vec![
        ChannelSnapshot::new("front-left", 0.6),
        ChannelSnapshot::new("front-right", 0.6),
        ChannelSnapshot::new("front-center", 0.6),
        ChannelSnapshot::new("lfe", 0.6),
        ChannelSnapshot::new("rear-left", 0.6),
        ChannelSnapshot::new("rear-right", 0.6),
    ];

    for name in [None, Some("movie"), Some("night")] {
        let profile = store.select(name)?;
        let compiled = CompiledProfile::compile(&profile)?;
        let adjustment: Adjustment = "5-".parse()?;

        let resolution = BalanceResolver::new(&compiled).resolve(&sink, adjustment);

        println!("\nProfile '{}' ({}):", compiled.name, adjustment);
        for (channel, target) in sink.iter().zip(&resolution.channels) {
            println!(
                "   {:>14}  {:>5.1}% -> {:>5.1}%{}",
                channel.position,
                channel.volume * 100.0,
                target.target_volume * 100.0,
                if target.clamped { "  (floor)" } else { "" }
            );
        }
        for warning in &resolution.warnings {
            println!("   warning: {}", warning);
        }
    }

    Ok(())
}
