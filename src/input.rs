//! Operator console: key presses and text commands.
//!
//! The console reader turns lines into [`InputEvent`]s on a channel. One
//! [`OperatorSession`] consumes them, remembers the last key pressed, and
//! applies commands to the shared engine.

use crate::core::engine::{lock_engine, EngineError, EngineStatus, Mode, SharedEngine};
use crate::core::library::LibraryError;
use crate::core::trigger::KeyTrigger;
use crate::stats::SharedSessionStats;
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Something the operator did at the console.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Select the key the next `save` binds to
    KeyPressed(i32),
    Command(OperatorCommand),
    /// A line that did not parse
    Invalid(String),
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Key(i32),
    /// Bind the locked pose to the last key pressed
    Save { hold_time_ms: u32, is_click: bool },
    Bind { key: i32, hold_time_ms: u32, is_click: bool },
    Clear,
    ClearAll,
    Remove(usize),
    Import(PathBuf),
    Export(PathBuf),
    Threshold(f32),
    /// Compare only these joints; empty means every joint
    Mask(Vec<String>),
    /// Compare every joint except these
    Exclude(Vec<String>),
    Mode(Mode),
    Status,
    List,
    Help,
    Quit,
}

impl OperatorCommand {
    /// Parse one console line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Parse("empty command".to_string()));
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_lowercase().as_str() {
            "key" => OperatorCommand::Key(parse_arg(args.first(), "key code")?),
            "save" => {
                let (hold_time_ms, is_click) = parse_hold(&args)?;
                OperatorCommand::Save {
                    hold_time_ms,
                    is_click,
                }
            }
            "bind" => {
                let key = parse_arg(args.first(), "key code")?;
                let (hold_time_ms, is_click) = parse_hold(&args[1..])?;
                OperatorCommand::Bind {
                    key,
                    hold_time_ms,
                    is_click,
                }
            }
            "clear" => OperatorCommand::Clear,
            "clearall" => OperatorCommand::ClearAll,
            "remove" => OperatorCommand::Remove(parse_arg(args.first(), "record index")?),
            "import" => OperatorCommand::Import(path_arg(&args)?),
            "export" => OperatorCommand::Export(path_arg(&args)?),
            "threshold" => OperatorCommand::Threshold(parse_arg(args.first(), "threshold")?),
            "mask" => OperatorCommand::Mask(joint_list(&args, "all")),
            "exclude" => OperatorCommand::Exclude(joint_list(&args, "none")),
            "mode" => {
                let raw = args
                    .first()
                    .ok_or_else(|| CommandError::Parse("missing mode".to_string()))?;
                let mode = Mode::parse(raw)
                    .ok_or_else(|| CommandError::Parse(format!("unknown mode: {raw}")))?;
                OperatorCommand::Mode(mode)
            }
            "status" => OperatorCommand::Status,
            "list" => OperatorCommand::List,
            "help" | "?" => OperatorCommand::Help,
            "quit" | "exit" => OperatorCommand::Quit,
            other => return Err(CommandError::Parse(format!("unknown command: {other}"))),
        };
        Ok(command)
    }
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&&str>, what: &str) -> Result<T, CommandError> {
    let raw = arg.ok_or_else(|| CommandError::Parse(format!("missing {what}")))?;
    raw.parse()
        .map_err(|_| CommandError::Parse(format!("invalid {what}: {raw}")))
}

/// `[hold_ms] [click|hold]`, defaulting to an immediate click.
fn parse_hold(args: &[&str]) -> Result<(u32, bool), CommandError> {
    let mut hold_time_ms = 0;
    let mut is_click = true;
    for arg in args {
        match arg.to_lowercase().as_str() {
            "click" => is_click = true,
            "hold" => is_click = false,
            raw => {
                hold_time_ms = raw
                    .parse()
                    .map_err(|_| CommandError::Parse(format!("invalid hold time: {raw}")))?;
            }
        }
    }
    Ok((hold_time_ms, is_click))
}

fn path_arg(args: &[&str]) -> Result<PathBuf, CommandError> {
    if args.is_empty() {
        return Err(CommandError::Parse("missing path".to_string()));
    }
    Ok(PathBuf::from(args.join(" ")))
}

/// Joint names separated by commas or spaces. `everything` alone means none.
fn joint_list(args: &[&str], everything: &str) -> Vec<String> {
    let names: Vec<String> = args
        .iter()
        .flat_map(|arg| arg.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.len() == 1 && names[0].eq_ignore_ascii_case(everything) {
        Vec::new()
    } else {
        names
    }
}

/// Errors from operator commands.
#[derive(Debug)]
pub enum CommandError {
    Parse(String),
    UnknownJoint(String),
    NoKeySelected,
    NoPoseLocked,
    NoSuchRecord(usize),
    Library(LibraryError),
    Engine(EngineError),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Parse(e) => write!(f, "{e}"),
            CommandError::UnknownJoint(name) => write!(f, "Unknown joint: {name}"),
            CommandError::NoKeySelected => write!(f, "No key selected, press one with `key <code>`"),
            CommandError::NoPoseLocked => write!(f, "No pose locked yet, hold still"),
            CommandError::NoSuchRecord(i) => write!(f, "No pose at index {i}"),
            CommandError::Library(e) => write!(f, "{e}"),
            CommandError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<LibraryError> for CommandError {
    fn from(e: LibraryError) -> Self {
        CommandError::Library(e)
    }
}

impl From<EngineError> for CommandError {
    fn from(e: EngineError) -> Self {
        CommandError::Engine(e)
    }
}

/// Help text for the console.
pub const CONSOLE_HELP: &str = "\
Commands:
  key <code>                      select the key for the next save
  save [hold_ms] [click|hold]     bind the locked pose to the selected key
  bind <code> [hold_ms] [click|hold]
  clear                           drop the locked pose
  clearall                        drop every bound pose
  remove <index>                  drop one bound pose
  list                            list bound poses
  import <path> | export <path>
  threshold <t>
  mask <joint,...|all>            compare only these joints
  exclude <joint,...|none>        compare all but these joints
  mode <record|execute>
  status | help | quit";

/// Applies operator input to the shared engine.
pub struct OperatorSession {
    engine: SharedEngine,
    stats: SharedSessionStats,
    last_key: Option<i32>,
    trigger_sink: Option<Sender<KeyTrigger>>,
}

impl OperatorSession {
    pub fn new(engine: SharedEngine, stats: SharedSessionStats) -> Self {
        Self {
            engine,
            stats,
            last_key: None,
            trigger_sink: None,
        }
    }

    /// Forward key releases caused by commands to the key injector.
    pub fn with_trigger_sink(mut self, sink: Sender<KeyTrigger>) -> Self {
        self.trigger_sink = Some(sink);
        self
    }

    pub fn last_key(&self) -> Option<i32> {
        self.last_key
    }

    /// Handle one console event. Returns `None` for plain key presses.
    pub fn handle(&mut self, event: InputEvent) -> Option<Result<String, CommandError>> {
        match event {
            InputEvent::KeyPressed(code) => {
                self.press_key(code);
                None
            }
            InputEvent::Command(command) => Some(self.execute(command)),
            InputEvent::Invalid(reason) => Some(Err(CommandError::Parse(reason))),
        }
    }

    pub fn press_key(&mut self, code: i32) {
        debug!(code, "Key selected");
        self.last_key = Some(code);
    }

    /// Apply a command and describe the result.
    pub fn execute(&mut self, command: OperatorCommand) -> Result<String, CommandError> {
        match command {
            OperatorCommand::Key(code) => {
                self.press_key(code);
                Ok(format!("Key {code} selected"))
            }
            OperatorCommand::Save {
                hold_time_ms,
                is_click,
            } => {
                let key = self.last_key.ok_or(CommandError::NoKeySelected)?;
                self.bind(key, hold_time_ms, is_click)
            }
            OperatorCommand::Bind {
                key,
                hold_time_ms,
                is_click,
            } => self.bind(key, hold_time_ms, is_click),
            OperatorCommand::Clear => {
                lock_engine(&self.engine).clear();
                Ok("Pose cleared".to_string())
            }
            OperatorCommand::ClearAll => {
                let released = lock_engine(&self.engine).clear_all();
                self.forward(released);
                info!("Library cleared");
                Ok("All poses cleared".to_string())
            }
            OperatorCommand::Remove(index) => {
                let (removed, released) = lock_engine(&self.engine).remove(index);
                self.forward(released);
                let record = removed.ok_or(CommandError::NoSuchRecord(index))?;
                Ok(format!("Removed pose {index} (key {})", record.key))
            }
            OperatorCommand::Import(path) => {
                let added = lock_engine(&self.engine).import(&path)?;
                Ok(format!("Imported {added} poses from {}", path.display()))
            }
            OperatorCommand::Export(path) => {
                let engine = lock_engine(&self.engine);
                engine.export(&path)?;
                Ok(format!(
                    "Exported {} poses to {}",
                    engine.library().len(),
                    path.display()
                ))
            }
            OperatorCommand::Threshold(threshold) => {
                lock_engine(&self.engine).set_threshold(threshold)?;
                Ok(format!("Threshold set to {threshold}"))
            }
            OperatorCommand::Mask(names) => {
                let mut engine = lock_engine(&self.engine);
                let topology = engine.topology();
                let mask = if names.is_empty() {
                    topology.mask_excluding::<&str>(&[])
                } else {
                    topology.mask_including(&names)
                }
                .map_err(CommandError::UnknownJoint)?;
                let count = mask.included_count();
                engine.set_joint_mask(mask)?;
                Ok(format!("Comparing {count} joints"))
            }
            OperatorCommand::Exclude(names) => {
                let mut engine = lock_engine(&self.engine);
                let mask = engine
                    .topology()
                    .mask_excluding(&names)
                    .map_err(CommandError::UnknownJoint)?;
                let count = mask.included_count();
                engine.set_joint_mask(mask)?;
                Ok(format!("Comparing {count} joints"))
            }
            OperatorCommand::Mode(mode) => {
                let released = lock_engine(&self.engine).set_mode(mode);
                self.forward(released);
                Ok(format!("Mode: {mode}"))
            }
            OperatorCommand::Status => Ok(format_status(&lock_engine(&self.engine).status())),
            OperatorCommand::List => {
                let engine = lock_engine(&self.engine);
                let records = engine.library().records();
                if records.is_empty() {
                    return Ok("No poses bound".to_string());
                }
                let lines: Vec<String> = records
                    .iter()
                    .enumerate()
                    .map(|(i, r)| {
                        let style = if r.is_click { "click" } else { "hold" };
                        format!("  [{i}] key {} ({style}, {} ms)", r.key, r.hold_time_ms)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            OperatorCommand::Help => Ok(CONSOLE_HELP.to_string()),
            OperatorCommand::Quit => Ok("Bye".to_string()),
        }
    }

    fn bind(&mut self, key: i32, hold_time_ms: u32, is_click: bool) -> Result<String, CommandError> {
        let saved = lock_engine(&self.engine).save(key, hold_time_ms, is_click);
        if !saved {
            return Err(CommandError::NoPoseLocked);
        }
        self.stats.record_save();
        Ok(format!("Pose bound to key {key}"))
    }

    fn forward(&self, triggers: Vec<KeyTrigger>) {
        let Some(ref sink) = self.trigger_sink else {
            return;
        };
        for trigger in triggers {
            if sink.try_send(trigger).is_err() {
                warn!("Trigger channel full, dropping release");
            }
        }
    }
}

/// One status block for the console.
pub fn format_status(status: &EngineStatus) -> String {
    let mut out = format!(
        "Mode: {}\nState: {:?} ({}/{} frames)\nLive: {:?}\nThreshold: {}\nJoints compared: {}\nPoses bound: {}",
        status.mode,
        status.state,
        status.window_len,
        status.stability_frames,
        status.live,
        status.threshold,
        status.included_joints,
        status.library_size,
    );
    if let Some(key) = status.active_key {
        out.push_str(&format!("\nActive key: {key}"));
    }
    if let Some(ref report) = status.last_settle {
        out.push_str(&format!(
            "\nLast settle: {} frames, mean deviation {:.3}, max {:.3}",
            report.frame_count, report.mean_deviation, report.max_deviation
        ));
    }
    if status.feed_stopped {
        out.push_str("\nFEED STOPPED: the tracker failed");
    }
    out
}

/// Read console lines on a background thread until EOF or `quit`.
pub fn spawn_console_reader<R>(reader: R, events: Sender<InputEvent>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let event = match OperatorCommand::parse(&line) {
                    Ok(OperatorCommand::Key(code)) => InputEvent::KeyPressed(code),
                    Ok(command) => InputEvent::Command(command),
                    Err(e) => InputEvent::Invalid(e.to_string()),
                };
                let quit = event == InputEvent::Command(OperatorCommand::Quit);
                if events.send(event).is_err() || quit {
                    break;
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::topology::AZURE_KINECT;
    use crate::core::compare::CompareSettings;
    use crate::core::engine::{create_shared_engine, PoseEngine};
    use crate::core::types::{Confidence, SkeletonFrame};
    use crate::stats::create_shared_stats;
    use crossbeam_channel::unbounded;
    use std::io::Cursor;

    fn session() -> OperatorSession {
        let engine = create_shared_engine(PoseEngine::new(
            &AZURE_KINECT,
            CompareSettings::all_joints(32),
            30,
        ));
        OperatorSession::new(engine, create_shared_stats())
    }

    fn lock_pose(session: &OperatorSession) {
        let mut engine = lock_engine(&session.engine);
        for _ in 0..31 {
            engine.ingest(SkeletonFrame::uniform(
                32,
                [1.0, 0.0, 0.0, 0.0],
                Confidence::High,
            ));
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(OperatorCommand::parse("key 65").unwrap(), OperatorCommand::Key(65));
        assert_eq!(
            OperatorCommand::parse("save").unwrap(),
            OperatorCommand::Save {
                hold_time_ms: 0,
                is_click: true
            }
        );
        assert_eq!(
            OperatorCommand::parse("bind 32 250 hold").unwrap(),
            OperatorCommand::Bind {
                key: 32,
                hold_time_ms: 250,
                is_click: false
            }
        );
        assert_eq!(
            OperatorCommand::parse("exclude hand_left, hand_right").unwrap(),
            OperatorCommand::Exclude(vec!["hand_left".to_string(), "hand_right".to_string()])
        );
        assert_eq!(
            OperatorCommand::parse("mask all").unwrap(),
            OperatorCommand::Mask(Vec::new())
        );
        assert_eq!(
            OperatorCommand::parse("MODE exec").unwrap(),
            OperatorCommand::Mode(Mode::Execute)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(OperatorCommand::parse("").is_err());
        assert!(OperatorCommand::parse("key").is_err());
        assert!(OperatorCommand::parse("key abc").is_err());
        assert!(OperatorCommand::parse("threshold x").is_err());
        assert!(OperatorCommand::parse("mode dance").is_err());
        assert!(OperatorCommand::parse("jump").is_err());
    }

    #[test]
    fn test_save_requires_key_and_pose() {
        let mut session = session();
        let save = OperatorCommand::Save {
            hold_time_ms: 0,
            is_click: true,
        };
        assert!(matches!(
            session.execute(save.clone()),
            Err(CommandError::NoKeySelected)
        ));

        session.handle(InputEvent::KeyPressed(65));
        assert_eq!(session.last_key(), Some(65));
        assert!(matches!(
            session.execute(save.clone()),
            Err(CommandError::NoPoseLocked)
        ));

        lock_pose(&session);
        assert!(session.execute(save).is_ok());
        assert_eq!(lock_engine(&session.engine).library().len(), 1);
        assert_eq!(session.stats.stats().poses_saved, 1);
    }

    #[test]
    fn test_mask_commands_update_engine() {
        let mut session = session();
        session
            .execute(OperatorCommand::parse("exclude hand_left,hand_right").unwrap())
            .unwrap();
        assert_eq!(lock_engine(&session.engine).status().included_joints, 30);

        session
            .execute(OperatorCommand::parse("mask head neck").unwrap())
            .unwrap();
        assert_eq!(lock_engine(&session.engine).status().included_joints, 2);

        assert!(matches!(
            session.execute(OperatorCommand::parse("exclude wing").unwrap()),
            Err(CommandError::UnknownJoint(name)) if name == "wing"
        ));
        assert_eq!(lock_engine(&session.engine).status().included_joints, 2);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut session = session();
        assert!(matches!(
            session.execute(OperatorCommand::Remove(3)),
            Err(CommandError::NoSuchRecord(3))
        ));
    }

    #[test]
    fn test_export_then_import() {
        let path = std::env::temp_dir().join(format!(
            "pose-binder-console-{}.txt",
            std::process::id()
        ));
        let mut session = session();
        lock_pose(&session);
        session.execute(OperatorCommand::parse("bind 7").unwrap()).unwrap();
        session
            .execute(OperatorCommand::Export(path.clone()))
            .unwrap();

        let mut fresh = self::session();
        let reply = fresh.execute(OperatorCommand::Import(path.clone())).unwrap();
        assert!(reply.contains("Imported 1"));
        assert_eq!(lock_engine(&fresh.engine).library().records()[0].key, 7);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_console_reader_stops_at_quit() {
        let (tx, rx) = unbounded();
        let input = Cursor::new("key 65\n\nsave 100 hold\nbogus\nquit\nstatus\n");
        spawn_console_reader(input, tx).unwrap().join().unwrap();

        let events: Vec<InputEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], InputEvent::KeyPressed(65));
        assert_eq!(
            events[1],
            InputEvent::Command(OperatorCommand::Save {
                hold_time_ms: 100,
                is_click: false
            })
        );
        assert!(matches!(events[2], InputEvent::Invalid(_)));
        assert_eq!(events[3], InputEvent::Command(OperatorCommand::Quit));
    }
}
