//! Environment readiness check.

use crate::browser::chromium::find_chromium;
use crate::config::Config;
use crate::protect::Roster;
use anyhow::Result;

/// Check Chromium availability, profile writability, and the roster.
pub async fn run() -> Result<()> {
    println!("Vouchsafe Doctor");
    println!("================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let config = Config::from_env();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => {
            println!("[!!] Chromium NOT found. Install Chrome or set VOUCHSAFE_CHROMIUM_PATH.")
        }
    }

    let profile_ok = profile_writable(&config);
    if profile_ok {
        println!(
            "[OK] Profile dir writable: {}",
            config.profile_dir.display()
        );
    } else {
        println!(
            "[!!] Profile dir NOT writable: {}",
            config.profile_dir.display()
        );
    }

    match Roster::open(&Roster::default_path()) {
        Ok(roster) => println!("[OK] Protected roster: {} code(s)", roster.codes().len()),
        Err(e) => println!("[!!] Protected roster unreadable: {e}"),
    }

    println!();
    println!("Headless default: {}", config.headless);
    println!("Storefront:       {}", config.storefront.base_url);
    println!("Snapshots:        {}", config.snapshots);

    println!();
    if chromium.is_some() && profile_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if chromium.is_none() {
            println!("  Install Chrome, or point VOUCHSAFE_CHROMIUM_PATH at a Chromium binary.");
        }
        if !profile_ok {
            println!("  Set VOUCHSAFE_PROFILE_DIR to a writable directory.");
        }
    }

    Ok(())
}

fn profile_writable(config: &Config) -> bool {
    if std::fs::create_dir_all(&config.profile_dir).is_err() {
        return false;
    }
    let probe = config.profile_dir.join(".doctor-probe");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}
