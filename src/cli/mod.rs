use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub mod command;
pub mod info;
pub mod trace;

/// Units between progress bar updates.
const PROGRESS_INTERVAL: usize = 256;

pub fn create_spinner(multi: &MultiProgress, message: &str) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos} units | elapsed: {elapsed_precise}",
    )?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message.to_string());

    Ok(pb)
}

pub fn tick(pb: Option<&ProgressBar>, units: usize) {
    if let Some(pb) = pb {
        if units.is_multiple_of(PROGRESS_INTERVAL) {
            pb.set_position(units as u64);
        }
    }
}
