use std::io::Write;

use log::LevelFilter;

/// Install the global logger.
///
/// Lines look like `2026-10-19 12:00:00 - INFO - message`. `RUST_LOG`, when
/// set, overrides `level`. Repeated calls are ignored.
pub fn init_logging(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    let _ = builder.try_init();
}
