// Copyright 2022, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{App, Arg, ArgMatches};
use log::{error, info, warn, LevelFilter};
use std::error::Error;
use std::sync::{Arc, Mutex};
use syslog::{BasicLogger, Facility, Formatter3164};
use tokio::io::{AsyncBufReadExt, BufReader};

use hfp_ag::policy::{PrefixQuirks, PriorityStore};
use hfp_ag::{HeadsetStateMachine, HfpConfig, HfpDriver, HfpRunner, Message};

mod at;
mod collaborators;
mod shell;

use crate::collaborators::{ConsoleObserver, LoggingAudio, LoggingTransport, Phone, ShellTelephony};
use crate::shell::{parse_command, Command, HELP};

const PROCESS_NAME: &str = "hfp_agd";

fn build_args() -> App<'static, 'static> {
    App::new(PROCESS_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Hands-free profile audio gateway with a command shell on stdin")
        .arg(
            Arg::with_name("max-connections")
                .long("max-connections")
                .value_name("N")
                .takes_value(true)
                .help("Maximum connected hands-free peers (1 or 2)"),
        )
        .arg(
            Arg::with_name("quirk-prefix")
                .long("quirk-prefix")
                .value_name("PREFIX")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Address prefix of peers needing the delayed waiting call indication"),
        )
        .arg(
            Arg::with_name("inband-ringing")
                .long("inband-ringing")
                .help("Plays the ring tone over the audio link"),
        )
        .arg(
            Arg::with_name("playback-for-vr")
                .long("playback-for-vr")
                .help("Play silence while voice recognition holds the audio link"),
        )
        .arg(
            Arg::with_name("playback-for-voip")
                .long("playback-for-voip")
                .help("Play silence while a virtual call holds the audio link"),
        )
        .arg(Arg::with_name("debug").long("debug").short("d").help("Enables debug logging"))
        .arg(Arg::with_name("verbose").long("verbose").short("v").help("Enables trace logging"))
        .arg(Arg::with_name("syslog").long("syslog").help("Logs to syslog instead of stderr"))
}

fn config_from_args(matches: &ArgMatches) -> Result<HfpConfig, String> {
    let mut config = HfpConfig::default();
    if let Some(value) = matches.value_of("max-connections") {
        let max =
            value.parse::<usize>().map_err(|_| format!("invalid max-connections: {}", value))?;
        config = config.with_max_connections(max);
    }
    if let Some(prefixes) = matches.values_of("quirk-prefix") {
        config.quirk_prefixes = prefixes.map(|p| p.to_lowercase()).collect();
    }
    config.inband_ringing = matches.is_present("inband-ringing");
    config.playback_for_vr = matches.is_present("playback-for-vr");
    config.playback_for_voip = matches.is_present("playback-for-voip");
    Ok(config)
}

fn log_level(matches: &ArgMatches) -> LevelFilter {
    if matches.is_present("verbose") {
        LevelFilter::Trace
    } else if matches.is_present("debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn init_logging(level: LevelFilter, use_syslog: bool) -> Result<(), String> {
    if use_syslog {
        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: PROCESS_NAME.into(),
            pid: std::process::id(),
        };
        let logger =
            syslog::unix(formatter).map_err(|e| format!("can't connect to syslog: {}", e))?;
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|()| log::set_max_level(level))
            .map_err(|e| e.to_string())?;
    } else {
        env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .try_init()
            .map_err(|e| e.to_string())?;
    }
    log_panics::init();
    Ok(())
}

/// Applies one shell line. Returns false when the shell should exit.
fn handle_line(
    line: &str,
    runner: &HfpRunner,
    phone: &Phone,
    store: &Arc<Mutex<PriorityStore>>,
) -> bool {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    let message = match command {
        Command::Event(event) => Message::Event(event),
        Command::Dump => Message::Call(Box::new(|driver: &mut HfpDriver| {
            print!("{}", driver.machine().dump());
        })),
        Command::Devices => Message::Call(Box::new(|driver: &mut HfpDriver| {
            for addr in driver.machine().connected_devices() {
                let audio = driver.machine().get_audio_state(&addr);
                println!("{} audio {:?}", addr, audio);
            }
        })),
        Command::Call(step, number) => {
            phone.step(step, &number);
            return true;
        }
        Command::Operator(name) => {
            phone.set_operator(name);
            return true;
        }
        Command::Subscriber(number) => {
            phone.set_subscriber(number);
            return true;
        }
        Command::Bond(addr, state) => {
            match store.lock() {
                Ok(mut store) => store.set_bond_state(addr, state),
                Err(e) => error!("Device store unavailable: {}", e),
            }
            return true;
        }
        Command::Priority(addr, priority) => {
            match store.lock() {
                Ok(mut store) => store.set_priority(addr, priority),
                Err(e) => error!("Device store unavailable: {}", e),
            }
            return true;
        }
        Command::Help => {
            println!("{}", HELP);
            return true;
        }
        Command::Quit => return false,
    };

    if let Err((reason, message)) = runner.send(message) {
        warn!("Dropping {:?}: {}", message, reason);
    }
    true
}

async fn run(config: HfpConfig) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(Mutex::new(PriorityStore::new()));
    let mut runner = HfpRunner::new();
    let (tx, rx) = runner.start()?;

    let phone = Phone::new(tx.clone());
    let quirks = PrefixQuirks::new(&config.quirk_prefixes);
    let machine = HeadsetStateMachine::new(config, Box::new(store.clone()), Box::new(quirks));
    let mut driver = HfpDriver::new(
        machine,
        Box::new(LoggingTransport),
        Box::new(LoggingAudio),
        Box::new(ShellTelephony::new(phone.clone())),
        tx,
    );
    driver.register_callback(Box::new(ConsoleObserver));
    let event_loop = tokio::spawn(driver.run(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&line, &runner, &phone, &store) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    runner.shutdown();
    let result = event_loop.await.map_err(|e| e.to_string());
    if let Err(e) = runner.finished(result) {
        warn!("failed to record runner finish: {}", e);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = build_args().get_matches();
    let config = match config_from_args(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    init_logging(log_level(&matches), matches.is_present("syslog"))?;
    info!("Starting {} with {:?}", PROCESS_NAME, config);

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(config))
}
