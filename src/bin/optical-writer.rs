use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use optical_writer::preflight::{check_configured_tools, check_writer_tools};
use optical_writer::{CommandPaths, ImageWriter, MediaClass, WriteOptions, WriterConfig};

fn usage() -> &'static str {
    "Usage:\n  optical-writer [--config <file>] capacity [entire]\n  optical-writer [--config <file>] write <tmpdir> <new|append> <source[=graft]>...\n  optical-writer [--config <file>] write-image <image> <new|append>\n  optical-writer [--config <file>] tray <open|close|refresh>\n  optical-writer [--config <file>] preflight [cd|dvd]\n\nWithout --config, <config dir>/optical-writer/writer.toml is used."
}

fn main() -> Result<()> {
    if let Err(e) = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
    {
        eprintln!("failed to initialize logging: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, args) = match args.as_slice() {
        [flag, path, rest @ ..] if flag == "--config" => (Some(PathBuf::from(path)), rest),
        [flag] if flag == "--config" => bail!(usage()),
        rest => (None, rest),
    };
    let config = config.as_deref();

    match args {
        [cmd] if cmd == "capacity" => show_capacity(config, false),
        [cmd, entire] if cmd == "capacity" && entire == "entire" => show_capacity(config, true),
        [cmd, tmpdir, mode, sources @ ..] if cmd == "write" && !sources.is_empty() => {
            write_sources(config, Path::new(tmpdir), parse_mode(mode)?, sources)
        }
        [cmd, image, mode] if cmd == "write-image" => {
            write_prebuilt(config, Path::new(image), parse_mode(mode)?)
        }
        [cmd, action] if cmd == "tray" => move_tray(config, action),
        [cmd] if cmd == "preflight" => preflight(config, None),
        [cmd, kind] if cmd == "preflight" => preflight(config, Some(kind)),
        _ => bail!(usage()),
    }
}

/// `new` rewrites the disc, `append` adds a session.
fn parse_mode(value: &str) -> Result<bool> {
    match value {
        "new" => Ok(true),
        "append" => Ok(false),
        other => bail!("unsupported write mode '{}'; expected 'new' or 'append'", other),
    }
}

fn config_path(config: Option<&Path>) -> Result<PathBuf> {
    match config {
        Some(path) => Ok(path.to_path_buf()),
        None => WriterConfig::default_path(),
    }
}

fn load_config(config: Option<&Path>) -> Result<WriterConfig> {
    WriterConfig::load(&config_path(config)?)
}

fn open_writer(config: Option<&Path>) -> Result<Box<dyn ImageWriter>> {
    load_config(config)?.open_writer()
}

fn show_capacity(config: Option<&Path>, entire_disc: bool) -> Result<()> {
    let writer = open_writer(config)?;
    let capacity = writer
        .retrieve_capacity(entire_disc)
        .with_context(|| format!("reading capacity of '{}'", writer.device().display()))?;
    println!("{}", serde_json::to_string_pretty(&capacity)?);
    Ok(())
}

fn write_sources(
    config: Option<&Path>,
    tmpdir: &Path,
    new_disc: bool,
    sources: &[String],
) -> Result<()> {
    let mut writer = open_writer(config)?;
    writer
        .initialize_image(new_disc, tmpdir)
        .context("initializing image")?;

    for source in sources {
        let (path, graft_point) = match source.split_once('=') {
            Some((path, graft)) => (PathBuf::from(path), Some(graft)),
            None => (PathBuf::from(source), None),
        };
        writer
            .add_image_entry(&path, graft_point)
            .with_context(|| format!("adding '{}' to image", path.display()))?;
    }

    writer
        .write_image(&WriteOptions::default())
        .with_context(|| format!("writing image to '{}'", writer.device().display()))?;
    println!("[write] wrote {} source(s) to {}", sources.len(), writer.device().display());
    Ok(())
}

fn write_prebuilt(config: Option<&Path>, image: &Path, new_disc: bool) -> Result<()> {
    let image = std::path::absolute(image)
        .with_context(|| format!("resolving image path '{}'", image.display()))?;
    let mut writer = open_writer(config)?;
    writer
        .write_image(&WriteOptions::image(&image, new_disc))
        .with_context(|| {
            format!(
                "writing '{}' to '{}'",
                image.display(),
                writer.device().display()
            )
        })?;
    println!("[write-image] wrote {} to {}", image.display(), writer.device().display());
    Ok(())
}

fn move_tray(config: Option<&Path>, action: &str) -> Result<()> {
    let writer = open_writer(config)?;
    let result = match action {
        "open" => writer.open_tray(),
        "close" => writer.close_tray(),
        "refresh" => writer.refresh_media(),
        other => bail!("unsupported tray action '{}'; expected open, close or refresh", other),
    };
    result.with_context(|| format!("tray {} on '{}'", action, writer.device().display()))
}

/// Check tools for `kind`, or for the configured writer when no kind is
/// given. Command overrides come from the config file when one is available.
fn preflight(config: Option<&Path>, kind: Option<&String>) -> Result<()> {
    let Some(kind) = kind else {
        let loaded = load_config(config)?;
        check_configured_tools(&loaded)?;
        println!("[preflight] all {} tools found", loaded.class);
        return Ok(());
    };

    let class = match kind.as_str() {
        "cd" => MediaClass::Cd,
        "dvd" => MediaClass::Dvd,
        other => bail!("unsupported writer kind '{}'; expected 'cd' or 'dvd'", other),
    };
    let path = config_path(config)?;
    let commands = if config.is_some() || path.exists() {
        WriterConfig::load(&path)?.commands
    } else {
        CommandPaths::default()
    };
    check_writer_tools(&commands, class)?;
    println!("[preflight] all {} tools found", class);
    Ok(())
}
