//! Captured poses bound to input keys, and their plain-text file format.
//!
//! A pose file is a sequence of records with no header:
//!
//! ```text
//! 65                      <- bound key
//! 0.71,0.0,0.71,0.0       <- joint 0 orientation
//! ...                     <- one line per joint, in topology order
//! ```
//!
//! Confidence is not stored; imported poses are trusted on every joint.

use crate::core::compare::CompareSettings;
use crate::core::stabilizer::PoseStabilizer;
use crate::core::types::{Confidence, JointOrientation, SkeletonFrame};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A captured pose and the key it triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub pose: SkeletonFrame,
    /// Opaque key identifier handed to the key injector
    pub key: i32,
    /// How long the pose must be held before it fires, in milliseconds
    pub hold_time_ms: u32,
    /// Fire a single click rather than holding the key down
    pub is_click: bool,
}

impl PoseRecord {
    pub fn new(pose: SkeletonFrame, key: i32) -> Self {
        Self {
            pose,
            key,
            hold_time_ms: 0,
            is_click: true,
        }
    }

    pub fn with_hold(mut self, hold_time_ms: u32, is_click: bool) -> Self {
        self.hold_time_ms = hold_time_ms;
        self.is_click = is_click;
        self
    }
}

/// Errors from reading or writing pose files.
#[derive(Debug)]
pub enum LibraryError {
    IoError(String),
    ParseError { line: usize, reason: String },
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::IoError(e) => write!(f, "IO error: {e}"),
            LibraryError::ParseError { line, reason } => {
                write!(f, "Parse error at line {line}: {reason}")
            }
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(e: std::io::Error) -> Self {
        LibraryError::IoError(e.to_string())
    }
}

/// Ordered list of bound poses. Records never change once added.
#[derive(Debug, Clone, Default)]
pub struct PoseLibrary {
    records: Vec<PoseRecord>,
}

impl PoseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the stabilizer's current pose to `key`.
    ///
    /// Does nothing and returns `false` when no pose is locked. Otherwise
    /// appends one record and clears the stabilizer.
    pub fn save(
        &mut self,
        stabilizer: &mut PoseStabilizer,
        key: i32,
        hold_time_ms: u32,
        is_click: bool,
    ) -> bool {
        let Some(pose) = stabilizer.current_pose() else {
            return false;
        };
        self.records
            .push(PoseRecord::new(pose.clone(), key).with_hold(hold_time_ms, is_click));
        stabilizer.clear();
        true
    }

    pub fn push(&mut self, record: PoseRecord) {
        self.records.push(record);
    }

    /// Drop every record and any pose the stabilizer is holding.
    pub fn clear_all(&mut self, stabilizer: &mut PoseStabilizer) {
        self.records.clear();
        stabilizer.clear();
    }

    /// Drop one record by position.
    pub fn remove(&mut self, index: usize) -> Option<PoseRecord> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PoseRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&PoseRecord> {
        self.records.get(index)
    }

    /// Index of the first record whose pose matches `frame`.
    pub fn find_match(&self, frame: &SkeletonFrame, settings: &CompareSettings) -> Option<usize> {
        self.records
            .iter()
            .position(|record| settings.matches(&record.pose, frame))
    }

    /// Write every record to `path`, replacing the file.
    pub fn export(&self, path: &Path) -> Result<(), LibraryError> {
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for record in &self.records {
            writeln!(writer, "{}", record.key)?;
            for joint in &record.pose.joints {
                let [a, b, c, d] = joint.orientation;
                writeln!(writer, "{a},{b},{c},{d}")?;
            }
        }
        Ok(())
    }

    /// Append the records stored in `path`.
    ///
    /// The file is parsed completely before anything is added, so a malformed
    /// file leaves the library unchanged. Returns the number of records added.
    pub fn import(&mut self, path: &Path, joint_count: usize) -> Result<usize, LibraryError> {
        let file = std::fs::File::open(path)?;
        let records = read_records(BufReader::new(file), joint_count)?;
        let added = records.len();
        self.records.extend(records);
        Ok(added)
    }
}

/// Parse pose records with `joint_count` joints each.
pub fn read_records<R: BufRead>(
    reader: R,
    joint_count: usize,
) -> Result<Vec<PoseRecord>, LibraryError> {
    let mut records = Vec::new();
    let mut lines = reader.lines().enumerate().map(|(i, line)| (i + 1, line));

    loop {
        // Blank lines between records are tolerated.
        let key_line = loop {
            match lines.next() {
                Some((number, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break Some((number, line));
                    }
                }
                None => break None,
            }
        };
        let Some((number, key_line)) = key_line else {
            break;
        };

        let key = key_line
            .trim()
            .parse::<i32>()
            .map_err(|e| LibraryError::ParseError {
                line: number,
                reason: format!("invalid key {:?}: {e}", key_line.trim()),
            })?;

        let mut joints = Vec::with_capacity(joint_count);
        for joint in 0..joint_count {
            let Some((number, line)) = lines.next() else {
                return Err(LibraryError::ParseError {
                    line: number + joint + 1,
                    reason: format!(
                        "file ended after {joint} of {joint_count} joints for key {key}"
                    ),
                });
            };
            let orientation = parse_orientation(&line?).map_err(|reason| {
                LibraryError::ParseError {
                    line: number,
                    reason,
                }
            })?;
            joints.push(JointOrientation::new(orientation, Confidence::High));
        }

        records.push(PoseRecord::new(SkeletonFrame::new(joints).trusted(), key));
    }

    Ok(records)
}

fn parse_orientation(line: &str) -> Result<[f32; 4], String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!(
            "expected 4 comma-separated components, found {}",
            fields.len()
        ));
    }

    let mut orientation = [0.0f32; 4];
    for (slot, field) in orientation.iter_mut().zip(&fields) {
        *slot = field
            .parse()
            .map_err(|e| format!("invalid component {field:?}: {e}"))?;
    }
    Ok(orientation)
}
