//! Session summaries

use anyhow::Result;
use concord::MechanismState;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Summary {
    pub sessions: usize,
    pub agreements: usize,
    pub broken: usize,
    pub timed_out: usize,
    pub exhausted: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_states<'a>(
        states: impl IntoIterator<Item = &'a MechanismState>,
        failed: usize,
    ) -> Self {
        let mut summary = Self {
            sessions: failed,
            agreements: 0,
            broken: 0,
            timed_out: 0,
            exhausted: 0,
            failed,
        };
        for state in states {
            summary.sessions += 1;
            match state.status {
                concord::SessionStatus::AgreementReached => summary.agreements += 1,
                concord::SessionStatus::Broken => summary.broken += 1,
                concord::SessionStatus::TimedOut => summary.timed_out += 1,
                concord::SessionStatus::Exhausted => summary.exhausted += 1,
                concord::SessionStatus::Running => {}
            }
        }
        summary
    }
}

pub fn print_state(state: &MechanismState) {
    println!("Session {}", state.session_id);
    println!("{:─<60}", "");
    println!("  status:     {}", state.status.as_str());
    println!("  steps:      {}", state.step);
    println!("  negotiators: {}", state.n_negotiators);
    if let Some(offer) = state.current_offer() {
        println!("  text:       {}", offer);
    }
    match &state.agreement {
        Some(agreement) => println!("  agreement:  {}", agreement),
        None => println!("  agreement:  none"),
    }
    if let Some(details) = &state.error_details {
        println!("  last error: {}", details);
    }
}

pub fn print_history(history: &[MechanismState]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(history)?);
    Ok(())
}

pub fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("Sessions: {}", summary.sessions);
    println!("{:─<60}", "");
    println!("  agreements: {}", summary.agreements);
    println!("  exhausted:  {}", summary.exhausted);
    println!("  broken:     {}", summary.broken);
    println!("  timed out:  {}", summary.timed_out);
    if summary.failed > 0 {
        println!("  failed:     {}", summary.failed);
    }
    Ok(())
}
