use clap::Parser;
use anyhow::{Context, Result};
use std::sync::mpsc;
use std::sync::Arc;

use dirpoll::{
    cli::{Cli, OutputFormat},
    listener_fn, BatchingQueueDrain, ChangeEvent, ChangeKind, DirPollConfig, DirectoryMonitor,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let mut config = DirPollConfig::load_or_default(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    if let Err(err) = config.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    let watch_path = cli.get_watch_path();
    tracing::info!("Starting dirpoll on: {}", watch_path.display());

    let monitor = DirectoryMonitor::with_config(&watch_path, &config.monitor)
        .with_context(|| format!("Cannot monitor {}", watch_path.display()))?;
    monitor.add_builtin_activities();

    let printer = Printer {
        format: cli.output,
        no_color: cli.no_color,
    };
    let filter = Arc::new(cli);

    let drain = if config.output.batch_events {
        let filter = filter.clone();
        let drain = Arc::new(BatchingQueueDrain::new(move |batch: Vec<ChangeEvent>| {
            for event in batch.iter().filter(|e| filter.should_watch_extension(e.path())) {
                printer.print(event);
            }
        }));
        drain.start()?;
        monitor.add_directory_listener(drain.clone());
        Some(drain)
    } else {
        monitor.add_directory_listener(Arc::new(listener_fn(move |event: &ChangeEvent| {
            if filter.should_watch_extension(event.path()) {
                printer.print(event);
            }
            Ok(())
        })));
        None
    };

    let (quit_tx, quit_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = quit_tx.send(());
    })?;

    if printer.format == OutputFormat::Text {
        println!("Watching: {}", watch_path.display());
        println!("Press Ctrl+C to quit");
        println!("---");
    }

    monitor.start()?;
    let _ = quit_rx.recv();

    monitor.stop()?;
    if let Some(drain) = drain {
        drain.stop()?;
    }

    Ok(())
}

#[derive(Clone, Copy)]
struct Printer {
    format: OutputFormat,
    no_color: bool,
}

impl Printer {
    fn print(&self, event: &ChangeEvent) {
        match self.format {
            OutputFormat::Text => self.print_text(event),
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(err) => tracing::warn!("Failed to serialize event: {}", err),
            },
            OutputFormat::Compact => println!("{} {}", event.kind().short(), event.path().display()),
        }
    }

    fn print_text(&self, event: &ChangeEvent) {
        let time_str = event
            .latest()
            .and_then(|record| chrono::DateTime::<chrono::Utc>::from_timestamp_millis(record.last_modified()))
            .map(|time| time.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());

        let size = match (event.before(), event.after()) {
            (Some(before), Some(after)) => format!("{} -> {} bytes", before.length(), after.length()),
            (_, Some(record)) | (Some(record), None) => format!("{} bytes", record.length()),
            (None, None) => String::new(),
        };

        if self.no_color {
            println!("[{}] {} {} ({})", time_str, event.kind(), event.path().display(), size);
        } else {
            let color = match event.kind() {
                ChangeKind::Created => "\x1b[32m",  // Green
                ChangeKind::Modified => "\x1b[33m", // Yellow
                ChangeKind::Deleted => "\x1b[31m",  // Red
            };
            println!("[{}] {}{}\x1b[0m {} ({})", time_str, color, event.kind(), event.path().display(), size);
        }
    }
}
