//! Demonstration of the pose binder on a synthetic recording.
//!
//! This example shows how to:
//! 1. Write a replay recording with a wobble, a steady hold and a gap
//! 2. Start the acquisition worker on it
//! 3. Watch the live status through the render mailbox
//! 4. Bind the locked pose to a key and export the library
//!
//! Run with: cargo run --example replay_demo

use std::thread;
use std::time::Duration;

use pose_binder::{
    backend::{write_recording, ReplayBackend, AZURE_KINECT},
    core::{
        create_shared_engine, lock_engine,
        types::{Confidence, SkeletonFrame},
        CompareSettings, PoseEngine,
    },
    create_shared_stats,
    input::{OperatorCommand, OperatorSession},
    AcquisitionWorker,
};

fn main() {
    println!("Pose Binder - Replay Demo");
    println!("=========================");
    println!();

    let dir = std::env::temp_dir().join("pose-binder-demo");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Could not create {dir:?}: {e}");
        return;
    }
    let recording = dir.join("session.jsonl");

    // A few wobbling frames, a gap, then a 40-frame hold
    let mut ticks = Vec::new();
    for i in 0..5 {
        let angle = i as f32 * 0.6;
        ticks.push(Some(SkeletonFrame::uniform(
            AZURE_KINECT.joint_count(),
            [angle.cos(), angle.sin(), 0.0, 0.0],
            Confidence::High,
        )));
    }
    ticks.push(None);
    for _ in 0..40 {
        ticks.push(Some(SkeletonFrame::uniform(
            AZURE_KINECT.joint_count(),
            [1.0, 0.0, 0.0, 0.0],
            Confidence::High,
        )));
    }
    if let Err(e) = write_recording(&recording, &ticks) {
        eprintln!("Could not write recording: {e}");
        return;
    }
    println!("Wrote {} ticks to {:?}", ticks.len(), recording);

    let settings = AZURE_KINECT
        .mask_excluding(&["hand_left", "hand_right"])
        .map(|mask| CompareSettings::new(mask, 1.0))
        .expect("known joints");
    let engine = create_shared_engine(PoseEngine::new(&AZURE_KINECT, settings, 30));
    let stats = create_shared_stats();

    let mut worker = AcquisitionWorker::new(engine.clone(), stats.clone());
    let backend =
        ReplayBackend::new(&recording, &AZURE_KINECT).with_frame_interval(Duration::from_millis(10));
    worker
        .start(Box::new(backend))
        .expect("Failed to open recording");

    println!("Replaying...");
    let mut last = None;
    while worker.is_running() {
        if let Some(snapshot) = worker.take_snapshot() {
            if last != Some(snapshot.status) {
                println!(
                    "  {:?} ({} vertices, {} bones)",
                    snapshot.status,
                    snapshot.vertices.len(),
                    snapshot.bones.len()
                );
                last = Some(snapshot.status);
            }
        }
        thread::sleep(Duration::from_millis(5));
    }
    worker.stop();
    println!();

    {
        let engine = lock_engine(&engine);
        let status = engine.status();
        println!("State: {:?}", status.state);
        if let Some(report) = status.last_settle {
            println!(
                "Settled over {} frames (mean deviation {:.4})",
                report.frame_count, report.mean_deviation
            );
        }
    }

    let mut session = OperatorSession::new(engine.clone(), stats.clone());
    let pose_file = dir.join("poses.txt");
    for command in [
        OperatorCommand::Key(32),
        OperatorCommand::Save {
            hold_time_ms: 0,
            is_click: true,
        },
        OperatorCommand::Export(pose_file),
    ] {
        match session.execute(command) {
            Ok(reply) => println!("{reply}"),
            Err(e) => println!("Error: {e}"),
        }
    }

    println!();
    println!("{}", stats.summary());
}
