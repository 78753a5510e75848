//! `vouchsafe protect` — manage the protected-code roster.

use super::output;
use crate::protect::Roster;
use anyhow::{bail, Result};

pub async fn run_add(codes: &[String]) -> Result<()> {
    if codes.is_empty() {
        bail!("no codes given");
    }
    let mut roster = Roster::open(&Roster::default_path())?;
    let mut added = 0;
    for code in codes {
        if roster.add(code) {
            added += 1;
        }
    }
    roster.save()?;
    output::print_line(&format!(
        "{added} added, {} already protected",
        codes.len() - added
    ));
    Ok(())
}

pub async fn run_release(codes: &[String]) -> Result<()> {
    if codes.is_empty() {
        bail!("no codes given");
    }
    let mut roster = Roster::open(&Roster::default_path())?;
    let mut released = 0;
    for code in codes {
        if roster.release(code) {
            released += 1;
        }
    }
    roster.save()?;
    output::print_line(&format!(
        "{released} released, {} were not protected",
        codes.len() - released
    ));
    Ok(())
}

pub async fn run_list() -> Result<()> {
    let roster = Roster::open(&Roster::default_path())?;
    let codes = roster.codes();

    if output::is_json() {
        output::print_json(&serde_json::json!({ "codes": codes }));
        return Ok(());
    }
    if codes.is_empty() {
        output::print_line("roster is empty");
        return Ok(());
    }
    for code in &codes {
        println!("{code}");
    }
    output::print_line(&format!("{} protected code(s)", codes.len()));
    Ok(())
}
