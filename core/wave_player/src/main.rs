use std::{env, io, process::ExitCode};

use wave_player::{Player, PlayerConfig};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let Some(path) = env::args().nth(1) else {
        log::error!("Usage: wave_player <file.wav>");
        return ExitCode::FAILURE;
    };

    let mut player = Player::new(PlayerConfig::default());
    if let Err(err) = player.open(&path).and_then(|_| player.play()) {
        log::error!("{err}");
        return ExitCode::FAILURE;
    }

    log::info!("Looping {path}, press Enter to stop");
    let mut line = String::new();
    if let Err(err) = io::stdin().read_line(&mut line) {
        log::warn!("Failed to read stdin: {err}");
    }

    player.close();
    ExitCode::SUCCESS
}
