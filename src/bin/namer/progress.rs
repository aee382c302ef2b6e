use std::thread;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use image_namer::namer::RunHandle;

const PROGRESS_BAR_CHARS: &str = "=>-";

const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:60.magenta/blue} {pos}/{len} ETA {eta} {msg}";

/// Poll the running worker until it is done, showing a progress bar.
///
/// Only the latest queued message is shown on the bar.
/// With `verbose`, every message is also printed above it.
pub fn follow(handle: &RunHandle, tick: Duration, verbose: bool) -> Result<()> {
    let progress_bar = ProgressBar::new(handle.stats().total() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_BAR_TEMPLATE)?
            .progress_chars(PROGRESS_BAR_CHARS),
    );

    loop {
        // Read before draining so messages sent just before finishing are still shown.
        let finished = handle.stats().is_done() || handle.is_finished();

        let mut latest = None;
        for message in handle.messages().try_iter() {
            if verbose {
                progress_bar.println(&message);
            }
            latest = Some(message);
        }
        if let Some(message) = latest {
            progress_bar.set_message(message);
        }
        progress_bar.set_position(handle.stats().processed() as u64);

        if finished {
            break;
        }
        thread::sleep(tick);
    }

    progress_bar.finish();
    Ok(())
}
