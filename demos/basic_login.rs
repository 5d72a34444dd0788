//! Enroll a user, train the keystroke profile, then try an impostor.
//!
//! Run with: `RUST_LOG=keyharden=debug cargo run --example basic_login`

use keyharden::{HardeningConfig, Hardener, MemoryStore};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Ten-character password => 19 timing features.
    let password = ".tie5Roanl";
    let thresholds = vec![0.15; 19];
    // Real timings print with many digits; give the history block room.
    let config = HardeningConfig::default()
        .with_history_window(10)
        .with_history_size(8192);

    let mut hardener = Hardener::with_os_rng(MemoryStore::new(thresholds), config)?;
    hardener.enroll("alice", password)?;

    // Alice's typing: every feature a little faster than the threshold.
    let alice: Vec<f64> = (0..19).map(|i| 0.08 + (i % 3) as f64 * 0.01).collect();
    for n in 1..=10 {
        let ok = hardener.login("alice", password, &alice);
        println!("login {:2}: {}", n, if ok { "accepted" } else { "rejected" });
    }

    // Someone who knows the password but types slowly.
    let impostor = vec![0.25; 19];
    println!(
        "impostor with password: {}",
        if hardener.login("alice", password, &impostor) {
            "accepted"
        } else {
            "rejected"
        }
    );
    println!(
        "alice again: {}",
        if hardener.login("alice", password, &alice) {
            "accepted"
        } else {
            "rejected"
        }
    );

    println!(
        "\nDistinguishing ratio: {:.1}%",
        hardener.counters().distinguishing_ratio() * 100.0
    );
    println!("Counters: {}", serde_json::to_string(hardener.counters())?);

    Ok(())
}
