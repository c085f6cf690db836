use std::ops::Deref;
use std::panic;
use std::path::Path;
use std::process;
use std::str::FromStr;
use std::time::Duration;

use clap::{Arg, Command};
use crash_upload::{
    CrashReport, HttpUpload, ReqwestTransport, RetryPolicy, RetryTransport, UploadError,
    UploadOptions,
};
use log::{error, info};
use simplelog::{ColorChoice, ConfigBuilder, Level, LevelFilter, TermLogger, TerminalMode};

fn make_app() -> Command<'static> {
    Command::new("minidump-upload")
        .version(clap::crate_version!())
        .about("Uploads a minidump to a Breakpad crash collection server.")
        .next_line_help(true)
        .override_usage(
            "minidump-upload -p <product> -v <version> [OPTIONS] <minidump> <upload-url>",
        )
        .arg(
            Arg::new("prod")
                .short('p')
                .long("prod")
                .takes_value(true)
                .required(true)
                .help("Product name, sent as the `prod` field"),
        )
        .arg(
            Arg::new("ver")
                .short('v')
                .long("ver")
                .takes_value(true)
                .required(true)
                .help("Product version, sent as the `ver` field"),
        )
        .arg(
            Arg::new("proxy")
                .short('x')
                .long("proxy")
                .takes_value(true)
                .help("Send the upload through this proxy (`host:port` or a URL)"),
        )
        .arg(
            Arg::new("proxy-user")
                .short('u')
                .long("proxy-user")
                .takes_value(true)
                .requires("proxy")
                .help("Proxy credentials, as `user:password`"),
        )
        .arg(
            Arg::new("ca-certificate")
                .long("ca-certificate")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .help("PEM file with extra CA certificates to trust"),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .takes_value(true)
                .default_value("0")
                .validator(u32::from_str)
                .long_help(
                    "How many times to retry after a transient failure.

Only connection failures and 429/5xx answers are retried, with an exponential \
backoff starting at one second.",
                ),
        )
        .arg(
            Arg::new("timeout-secs")
                .long("timeout-secs")
                .takes_value(true)
                .default_value("60")
                .validator(u64::from_str)
                .help("Give up on the upload after this many seconds"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .possible_values(&["off", "error", "warn", "info", "debug", "trace"])
                .default_value("error")
                .takes_value(true)
                .help("Set the logging level"),
        )
        .arg(
            Arg::new("minidump")
                .required(true)
                .allow_invalid_utf8(true)
                .help("Path to the minidump file to upload"),
        )
        .arg(
            Arg::new("upload-url")
                .required(true)
                .help("URL of the collection server's submit endpoint"),
        )
}

fn upload(matches: &clap::ArgMatches) -> Result<String, UploadError> {
    let options = UploadOptions {
        proxy: matches.value_of("proxy").map(String::from),
        proxy_credentials: matches.value_of("proxy-user").map(String::from),
        ca_certificate_file: matches
            .value_of_os("ca-certificate")
            .map(|os_str| Path::new(os_str).to_owned()),
        timeout: matches
            .value_of("timeout-secs")
            .and_then(|x| u64::from_str(x).ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| UploadOptions::default().timeout),
    };
    let retries = matches
        .value_of("retries")
        .and_then(|x| u32::from_str(x).ok())
        .unwrap_or(0);
    let policy = RetryPolicy {
        max_attempts: retries.saturating_add(1),
        ..RetryPolicy::default()
    };

    let minidump = matches
        .value_of_os("minidump")
        .map(Path::new)
        .unwrap_or_else(|| Path::new(""));
    let url = matches.value_of("upload-url").unwrap_or_default();
    let report = CrashReport::new(
        matches.value_of("prod").unwrap_or_default(),
        matches.value_of("ver").unwrap_or_default(),
        minidump,
    );
    info!("uploading {} as report {}", minidump.display(), report.guid);

    let transport = RetryTransport::new(ReqwestTransport::new(&options)?, policy);
    let response = HttpUpload::with_transport(transport).send(&report.into_request(url)?)?;
    Ok(response.body)
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let matches = make_app().get_matches();

    let verbosity = match matches.value_of("verbose").unwrap_or("error") {
        "off" => LevelFilter::Off,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Error,
    };
    let _ = TermLogger::init(
        verbosity,
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Off)
            .set_time_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .set_level_color(Level::Trace, None)
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    // Set a panic hook to redirect to the logger
    panic::set_hook(Box::new(|panic_info| {
        let (filename, line) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line()))
            .unwrap_or(("<unknown>", 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref)
            .unwrap_or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<&str>()
                    .copied()
                    .unwrap_or("<cause unknown>")
            });
        error!(
            "Panic - A panic occurred at {}:{}: {}",
            filename, line, cause
        );
    }));

    match upload(&matches) {
        Ok(body) => println!("{}", body),
        Err(err) => {
            // The minidump stays where it is so the caller can try again.
            match err.status_code() {
                0 => error!("upload failed: {}", err),
                status => error!(
                    "upload failed: {} ({}): {}",
                    err,
                    status,
                    err.response_body().unwrap_or_default()
                ),
            }
            process::exit(1);
        }
    }
}
