//! Pong Core headless driver
//!
//! Runs a versus-AI match with no renderer and logs the events it produces.
//!
//! Usage: `pong-core [config.json] [frames]`

use anyhow::{Context, Result};

use pong_core::sim::{FrameInput, GameEvent, Side, World};
use pong_core::{SessionMode, SimConfig};

const DEFAULT_FRAMES: u32 = 60 * 60;
const FRAME_DT: f32 = 1.0 / 60.0;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> Result<()> {
    env_logger::init();
    log::info!("Pong Core (headless) starting...");

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
            SimConfig::from_json(&json).with_context(|| format!("parsing config {path}"))?
        }
        None => SimConfig::default(),
    };
    let frames = match args.next() {
        Some(n) => n.parse::<u32>().with_context(|| format!("invalid frame count {n:?}"))?,
        None => DEFAULT_FRAMES,
    };
    if !matches!(config.session, SessionMode::VersusAi { .. }) {
        log::info!("headless driver forces a versus-AI session");
        config.session = SessionMode::VersusAi { ai_side: Side::Right };
    }

    let mut world = World::new(config);
    let mut score = [0u32; 2];
    let input = FrameInput::default();

    for frame in 0..frames {
        for event in world.step(&input, FRAME_DT) {
            match event {
                GameEvent::Score { side } => {
                    score[side as usize] += 1;
                    log::info!("frame {frame}: {} scores ({}-{})", side.as_str(), score[0], score[1]);
                }
                other => log::debug!("frame {frame}: {other:?}"),
            }
        }
    }

    println!(
        "{frames} frames, {:.1}s simulated, final score {}-{}",
        world.clock.now(),
        score[0],
        score[1]
    );
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // Library-only on the web; embedders drive `World::step` themselves
}
