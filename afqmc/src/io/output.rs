//! Output formatting and logging utilities

use backend::{CMatrix, SignedLogDet};
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::str::FromStr;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    filter::LevelFilter, fmt::format::Writer, fmt::layer, fmt::time::FormatTime,
    layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = StdSystemTime::now();
        let duration = now
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        // HH:MM:SS
        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup output logging to file or stdout, keeping events up to `level`
pub fn setup_output(output_path: Option<&String>, level: &str) -> Result<()> {
    let filter = LevelFilter::from_str(level)
        .map_err(|_| eyre!("Unknown log level: {}", level))?;
    match output_path {
        Some(path) => {
            let log = File::create(path)
                .wrap_err_with(|| format!("Could not create output file: {}", path))?;
            let file_layer = layer()
                .with_writer(log)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(false)
                .with_filter(filter);
            Registry::default().with(file_layer).init();
            info!("Output will be written to: {}", path);
        }
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true)
                .with_filter(filter);
            Registry::default().with(stdout_layer).init();
            info!("Output will be printed to stdout");
        }
    }
    Ok(())
}

/// Write one line per walker: log-magnitude and phase of the overlap, then the total,
/// one-body and two-body energies
pub fn write_energy_table<W: Write>(
    writer: &mut W,
    ovlp: &[SignedLogDet],
    energies: &CMatrix,
) -> Result<()> {
    if energies.nrows() != ovlp.len() || energies.ncols() != 3 {
        return Err(eyre!(
            "energy table is {}x{} for {} overlaps",
            energies.nrows(),
            energies.ncols(),
            ovlp.len()
        ));
    }
    writeln!(
        writer,
        "# {:>6} {:>20} {:>20} {:>20} {:>20} {:>20} {:>20}",
        "walker",
        "log|overlap|",
        "Re(phase)",
        "Im(phase)",
        "Re(E)",
        "Re(E1)",
        "Re(E2)"
    )?;
    for (w, o) in ovlp.iter().enumerate() {
        writeln!(
            writer,
            "  {:>6} {:>20.12} {:>20.12} {:>20.12} {:>20.12} {:>20.12} {:>20.12}",
            w,
            o.log_abs,
            o.sign.re,
            o.sign.im,
            energies[(w, 0)].re,
            energies[(w, 1)].re,
            energies[(w, 2)].re
        )?;
    }
    Ok(())
}
