//! Display utilities for the meditation timer CLI.
//!
//! This module provides formatted output for:
//! - Command acknowledgements
//! - Error messages
//! - Status display
//! - Live countdown lines for `watch`

use crate::types::{IpcResponse, ResponseData};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the daemon's acknowledgement followed by the remaining time.
    pub fn show_success(response: &IpcResponse) {
        println!("{}", response.message);

        if let Some(remaining) = response.data.as_ref().and_then(|d| d.remaining_seconds) {
            println!("  Remaining: {}", Self::format_clock(remaining));
        }
    }

    /// Shows the current timer status.
    pub fn show_status(response: &IpcResponse) {
        match &response.data {
            Some(data) => println!("{}", Self::status_lines(data)),
            None => println!("Timer status unavailable"),
        }
    }

    /// Shows one line of a `watch` stream.
    pub fn show_watch_line(data: &ResponseData) {
        println!("{}", Self::watch_line(data));
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    fn status_lines(data: &ResponseData) -> String {
        let state = data.state.as_deref().unwrap_or("unknown");
        let mut out = format!("State:     {}", Self::state_label(state));

        if let Some(remaining) = data.remaining_seconds {
            out.push_str(&format!("\nRemaining: {}", Self::format_clock(remaining)));
        }
        if let Some(total) = data.total_seconds {
            out.push_str(&format!("\nSession:   {}", Self::format_clock(total)));
        }
        out
    }

    fn watch_line(data: &ResponseData) -> String {
        let state = data.state.as_deref().unwrap_or("unknown");
        let remaining = data.remaining_seconds.unwrap_or(0);
        format!("{} {}", Self::format_clock(remaining), Self::state_label(state))
    }

    fn state_label(state: &str) -> &str {
        match state {
            "idle" => "Ready",
            "running" => "Meditating",
            "paused" => "Paused",
            "completed" => "Completed",
            other => other,
        }
    }

    /// Formats seconds as `mm:ss`, or `h:mm:ss` from one hour up.
    fn format_clock(total_seconds: u32) -> String {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
