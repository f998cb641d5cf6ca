use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};

/// Returns `true` if initialization is successful, or `false` if the logger
/// was already initialized (in which case this function does nothing, except
/// possibly create the file with the given name).
///
/// `debug_logging` controls which messages are written to the log file:
/// messages with `DEBUG` and higher priority (`true`), or only messages with
/// `INFO` and higher priority (`false`).
pub fn init(filename: impl Into<String>, debug_logging: bool) -> bool {
    let file_appender = FileAppender::builder()
        .append(false)  // truncate the output file
        .build(filename.into())
        .unwrap();
    let appender = Appender::builder()
        .build("logfile", Box::new(file_appender));
    let root = Root::builder()
        .appender("logfile")
        .build(
            if debug_logging { LevelFilter::Debug } else { LevelFilter::Info }
        );
    let config = Config::builder()
        .appender(appender)
        .build(root)
        .unwrap();
    log4rs::init_config(config).is_ok()
}
