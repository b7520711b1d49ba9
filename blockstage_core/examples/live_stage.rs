//! BlockStage live demo - four sprites racing to H7 on the wall clock.
//!
//! Compiles one block forest per sprite, runs them concurrently and
//! prints every snapshot as it arrives over a channel.
//!
//! Run: `cargo run --example live_stage`

use blockstage_core::{
    compile, AgentState, BlockNode, Cardinal, ChannelSink, EngineConfig, ExecutionCoordinator,
    Pose, RecordingCompletions,
};
use blockstage_env::{AgentId, TokioContext};
use std::collections::BTreeMap;
use std::sync::Arc;

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

use colors::*;

fn forward(n: f64) -> BlockNode {
    BlockNode::new("robot_maju").with_field("N", n)
}

fn right() -> BlockNode {
    BlockNode::new("robot_putar")
        .with_field("direction", "right")
        .with_field("DEG", 90.0)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let sprites = [
        ("Si Merah", RED, AgentState::grid(0, 8, Cardinal::East), vec![forward(7.0), right(), forward(2.0)]),
        ("Si Pink", MAGENTA, AgentState::grid(1, 0, Cardinal::North), vec![forward(6.0), right(), forward(6.0)]),
        ("Si Hijau", GREEN, AgentState::grid(7, 0, Cardinal::North), vec![forward(6.0)]),
        ("Si Kuning", YELLOW, AgentState::grid(9, 9, Cardinal::South), vec![forward(3.0), right(), forward(2.0)]),
    ];

    let mut labels = BTreeMap::new();
    let mut initial = BTreeMap::new();
    let mut programs = BTreeMap::new();
    for (i, (name, color, state, blocks)) in sprites.into_iter().enumerate() {
        let id = AgentId::from_index(i as u64);
        let compilation = compile(&blocks);
        for warning in &compilation.warnings {
            println!("{}: {}", name, warning);
        }
        labels.insert(id, format!("{}{}{}", color, name, RESET));
        initial.insert(id, state);
        programs.insert(id, compilation.program);
    }

    let (sink, mut rx) = ChannelSink::channel();
    let completions = Arc::new(RecordingCompletions::new());
    let config = EngineConfig::grid();
    let goal = config.goal.clone();
    let coordinator = ExecutionCoordinator::new(TokioContext::shared(), config)
        .with_effects(Arc::new(sink))
        .with_completion(completions.clone());

    let printer = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let label = labels.get(&snapshot.agent_id).cloned().unwrap_or_default();
            if let Pose::Grid { cell, heading } = snapshot.pose {
                let flag = if snapshot.goal_reached { " ★" } else { "" };
                println!("{:>22} → {:<3} facing {:>3}°{}", label, cell.label(), heading.degrees(), flag);
            }
        }
    });

    println!("{}BlockStage: 4 sprites, finish at H7{}", BOLD, RESET);
    let report = match coordinator.run_session(programs, &initial, &goal).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("session rejected: {}", e);
            return;
        }
    };

    // Dropping the coordinator closes the channel and ends the printer
    drop(coordinator);
    let _ = printer.await;

    println!(
        "\n{}{}/{} reached the finish in {:.2}s{}",
        BOLD, report.result.reached_count, report.result.total_agents, report.elapsed_seconds, RESET
    );
    if let Some(event) = completions.events().first() {
        println!("completion: {:?}", event);
    }
}
