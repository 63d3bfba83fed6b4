use crate::core::models::configuration::{Configuration, ModelError};
use crate::core::models::velocity::Velocities;
use nalgebra::{Point3, Vector3};
use std::io::{self, Read, Write};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: XyzParseErrorKind },
    #[error("Archive ends inside a frame starting on line {line}")]
    Truncated { line: usize },
    #[error("Inconsistent frame: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum XyzParseErrorKind {
    #[error("Invalid atom count '{0}'")]
    InvalidAtomCount(String),
    #[error("Invalid coordinate value '{0}'")]
    InvalidFloat(String),
    #[error("Atom line needs a symbol and three coordinates")]
    TooFewColumns,
}

/// One frame of an XYZ coordinate archive.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzFrame {
    pub atoms: Vec<String>,
    pub positions: Vec<Point3<f64>>,
    /// Box lengths parsed from the comment line, if it carries a box annotation.
    pub box_dims: Option<Vector3<f64>>,
}

impl XyzFrame {
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            atoms: config.atoms().to_vec(),
            positions: config.positions().to_vec(),
            box_dims: Some(config.box_dims()),
        }
    }

    /// Converts the frame into a standalone configuration.
    ///
    /// `default_box` is used when the comment line carried no box annotation.
    pub fn into_configuration(
        self,
        default_box: Option<Vector3<f64>>,
    ) -> Result<Configuration, XyzError> {
        let box_dims = self.box_dims.or(default_box).unwrap_or_else(Vector3::zeros);
        let atoms: Arc<[String]> = self.atoms.into();
        Ok(Configuration::new(atoms, self.positions, box_dims)?)
    }

    /// Converts the frame into a configuration sharing the atoms of `reference`.
    ///
    /// The frame's own box annotation wins; `reference` supplies the box only
    /// when the frame carries none.
    ///
    /// # Errors
    ///
    /// Fails if the atom symbols of the frame differ from those of `reference`.
    pub fn to_configuration_like(&self, reference: &Configuration) -> Result<Configuration, XyzError> {
        if self.atoms.len() != reference.len() {
            return Err(ModelError::AtomCountMismatch {
                expected: reference.len(),
                found: self.atoms.len(),
            }
            .into());
        }
        if let Some(index) = self
            .atoms
            .iter()
            .zip(reference.atoms())
            .position(|(a, b)| a != b)
        {
            return Err(ModelError::SymbolMismatch {
                index,
                expected: reference.atoms()[index].clone(),
                found: self.atoms[index].clone(),
            }
            .into());
        }
        let box_dims = self.box_dims.unwrap_or_else(|| reference.box_dims());
        Ok(Configuration::new(
            reference.shared_atoms(),
            self.positions.clone(),
            box_dims,
        )?)
    }
}

/// Frames found by [`scan_frames`], with the byte offset just past each one.
#[derive(Debug, Default)]
pub struct FrameScan {
    pub frames: Vec<XyzFrame>,
    pub ends: Vec<usize>,
}

impl FrameScan {
    /// Number of bytes covered by the complete frames.
    pub fn consumed(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }
}

struct LineCursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> LineCursor<'a> {
    /// Returns the next newline-terminated line; a trailing partial line is not returned.
    fn next_line(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        let end = rest.find('\n')?;
        self.pos += end + 1;
        self.line += 1;
        Some(rest[..end].trim_end_matches('\r'))
    }
}

pub fn format_box_annotation(box_dims: &Vector3<f64>) -> String {
    format!("box = {:.8} {:.8} {:.8}", box_dims.x, box_dims.y, box_dims.z)
}

/// Extracts box lengths from a comment line such as `box = 10.0 10.0 10.0`.
pub fn parse_box_annotation(comment: &str) -> Option<Vector3<f64>> {
    let lower = comment.to_ascii_lowercase();
    let start = lower.find("box")? + 3;
    let values: Vec<f64> = comment[start..]
        .trim_start_matches(|c: char| c.is_whitespace() || c == '=' || c == ':')
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .take(3)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [x, y, z] => Some(Vector3::new(*x, *y, *z)),
        _ => None,
    }
}

const MAX_PREALLOCATED_ATOMS: usize = 4096;

/// Parses complete frames from `text`, stopping at the first incomplete frame.
///
/// An incomplete trailing frame (one whose lines are not all newline-terminated
/// yet) is left unconsumed, which lets callers follow an archive that another
/// writer is still appending to. At most `limit` frames are returned.
pub fn scan_frames(text: &str, limit: Option<usize>) -> Result<FrameScan, XyzError> {
    let mut scan = FrameScan::default();
    let mut cursor = LineCursor {
        text,
        pos: 0,
        line: 0,
    };

    'frames: while limit.is_none_or(|l| scan.frames.len() < l) {
        let count_line = loop {
            match cursor.next_line() {
                Some(l) if l.trim().is_empty() => continue,
                Some(l) => break l,
                None => break 'frames,
            }
        };
        let n_atoms: usize = count_line.trim().parse().map_err(|_| XyzError::Parse {
            line: cursor.line,
            kind: XyzParseErrorKind::InvalidAtomCount(count_line.trim().to_string()),
        })?;
        let Some(comment) = cursor.next_line() else {
            break;
        };

        // The count line is untrusted until that many atom lines have been read.
        let mut atoms = Vec::with_capacity(n_atoms.min(MAX_PREALLOCATED_ATOMS));
        let mut positions = Vec::with_capacity(n_atoms.min(MAX_PREALLOCATED_ATOMS));
        for _ in 0..n_atoms {
            let Some(line) = cursor.next_line() else {
                break 'frames;
            };
            let (symbol, position) = parse_atom_line(line, cursor.line)?;
            atoms.push(symbol);
            positions.push(position);
        }

        scan.frames.push(XyzFrame {
            atoms,
            positions,
            box_dims: parse_box_annotation(comment),
        });
        scan.ends.push(cursor.pos);
    }
    Ok(scan)
}

fn parse_atom_line(line: &str, line_num: usize) -> Result<(String, Point3<f64>), XyzError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(XyzError::Parse {
            line: line_num,
            kind: XyzParseErrorKind::TooFewColumns,
        });
    }
    let mut coords = [0.0; 3];
    for (slot, raw) in coords.iter_mut().zip(&parts[1..4]) {
        *slot = raw.parse().map_err(|_| XyzError::Parse {
            line: line_num,
            kind: XyzParseErrorKind::InvalidFloat(raw.to_string()),
        })?;
    }
    Ok((
        parts[0].to_string(),
        Point3::new(coords[0], coords[1], coords[2]),
    ))
}

/// Reads every frame of a complete archive.
///
/// # Errors
///
/// Unlike [`scan_frames`], a truncated final frame is an error here.
pub fn read_frames(reader: &mut impl Read) -> Result<Vec<XyzFrame>, XyzError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    let scan = scan_frames(&text, None)?;
    let consumed = scan.consumed();
    if !text[consumed..].trim().is_empty() {
        let line = text[..consumed].matches('\n').count() + 1;
        return Err(XyzError::Truncated { line });
    }
    Ok(scan.frames)
}

/// Reads the first frame of an archive, or `None` if it holds no frames.
pub fn read_first_frame(reader: &mut impl Read) -> Result<Option<XyzFrame>, XyzError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    let scan = scan_frames(&text, Some(1))?;
    if scan.frames.is_empty() && !text.trim().is_empty() {
        return Err(XyzError::Truncated { line: 1 });
    }
    Ok(scan.frames.into_iter().next())
}

pub fn write_frame(writer: &mut impl Write, frame: &XyzFrame) -> io::Result<()> {
    writeln!(writer, "{}", frame.atoms.len())?;
    match &frame.box_dims {
        Some(b) => writeln!(writer, "{}", format_box_annotation(b))?,
        None => writeln!(writer)?,
    }
    for (symbol, p) in frame.atoms.iter().zip(&frame.positions) {
        writeln!(writer, "{} {:.10} {:.10} {:.10}", symbol, p.x, p.y, p.z)?;
    }
    Ok(())
}

pub fn write_configuration(writer: &mut impl Write, config: &Configuration) -> io::Result<()> {
    writeln!(writer, "{}", config.len())?;
    writeln!(writer, "{}", format_box_annotation(&config.box_dims()))?;
    for (symbol, p) in config.atoms().iter().zip(config.positions()) {
        writeln!(writer, "{} {:.10} {:.10} {:.10}", symbol, p.x, p.y, p.z)?;
    }
    Ok(())
}

/// Writes a velocity set as a single XYZ-style frame (symbol + vx vy vz in m/s).
pub fn write_velocities(
    writer: &mut impl Write,
    atoms: &[String],
    velocities: &Velocities,
) -> io::Result<()> {
    writeln!(writer, "{}", atoms.len())?;
    writeln!(writer, "velocities m/s")?;
    for (symbol, v) in atoms.iter().zip(velocities.vectors()) {
        writeln!(writer, "{} {:.10} {:.10} {:.10}", symbol, v.x, v.y, v.z)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FRAMES: &str = "\
2
box = 10.0 11.0 12.0
Na 0.0 0.0 0.0
Cl 2.8 0.0 0.0
2
box = 10.0 11.0 12.0
Na 0.1 0.0 0.0
Cl 2.9 0.0 0.0
";

    #[test]
    fn read_frames_parses_positions_and_box() {
        let frames = read_frames(&mut TWO_FRAMES.as_bytes()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].atoms, vec!["Na", "Cl"]);
        assert_eq!(frames[1].positions[1], Point3::new(2.9, 0.0, 0.0));
        assert_eq!(frames[0].box_dims, Some(Vector3::new(10.0, 11.0, 12.0)));
    }

    #[test]
    fn scan_frames_leaves_incomplete_frame_unconsumed() {
        let partial = format!("{}2\nbox = 1 1 1\nNa 0 0 0\n", TWO_FRAMES);
        let scan = scan_frames(&partial, None).unwrap();
        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.consumed(), TWO_FRAMES.len());
    }

    #[test]
    fn scan_frames_respects_limit() {
        let scan = scan_frames(TWO_FRAMES, Some(1)).unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert_eq!(&TWO_FRAMES[scan.consumed()..scan.consumed() + 2], "2\n");
    }

    #[test]
    fn read_frames_rejects_truncated_archive() {
        let truncated = "2\ncomment\nNa 0 0 0\n";
        assert!(matches!(
            read_frames(&mut truncated.as_bytes()),
            Err(XyzError::Truncated { .. })
        ));
    }

    #[test]
    fn read_frames_reports_bad_coordinates_with_line_number() {
        let bad = "1\n\nAr 0.0 abc 0.0\n";
        match read_frames(&mut bad.as_bytes()) {
            Err(XyzError::Parse { line, kind }) => {
                assert_eq!(line, 3);
                assert!(matches!(kind, XyzParseErrorKind::InvalidFloat(v) if v == "abc"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn frame_without_box_annotation_uses_default_box() {
        let text = "1\nplain comment\nAr 1.0 2.0 3.0";
        let frame = read_first_frame(&mut text.as_bytes()).unwrap().unwrap();
        assert_eq!(frame.box_dims, None);
        let config = frame
            .into_configuration(Some(Vector3::new(5.0, 5.0, 5.0)))
            .unwrap();
        assert_eq!(config.box_dims(), Vector3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn written_configuration_reads_back() {
        let frame = read_first_frame(&mut TWO_FRAMES.as_bytes()).unwrap().unwrap();
        let config = frame.into_configuration(None).unwrap();
        let mut buffer = Vec::new();
        write_configuration(&mut buffer, &config).unwrap();
        let back = read_frames(&mut buffer.as_slice()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0], XyzFrame::from_configuration(&config));
    }

    #[test]
    fn oversized_atom_count_is_a_truncated_frame() {
        let huge = "18446744073709551615\ncomment\nAr 0 0 0\n";
        assert!(matches!(
            read_frames(&mut huge.as_bytes()),
            Err(XyzError::Truncated { line: 1 })
        ));
        assert!(scan_frames(huge, None).unwrap().frames.is_empty());
    }

    #[test]
    fn frame_box_wins_over_reference_box() {
        let reference = read_first_frame(&mut TWO_FRAMES.as_bytes())
            .unwrap()
            .unwrap()
            .into_configuration(None)
            .unwrap();
        let resized = "2\nbox = 30 30 30\nNa 0.5 0.0 0.0\nCl 3.0 0.0 0.0\n";
        let frame = read_first_frame(&mut resized.as_bytes()).unwrap().unwrap();
        let config = frame.to_configuration_like(&reference).unwrap();
        assert_eq!(config.box_dims(), Vector3::new(30.0, 30.0, 30.0));
        assert!(Arc::ptr_eq(&config.shared_atoms(), &reference.shared_atoms()));

        let plain = "2\nstep 4\nNa 0.5 0.0 0.0\nCl 3.0 0.0 0.0\n";
        let frame = read_first_frame(&mut plain.as_bytes()).unwrap().unwrap();
        let config = frame.to_configuration_like(&reference).unwrap();
        assert_eq!(config.box_dims(), reference.box_dims());
    }

    #[test]
    fn parse_box_annotation_accepts_common_spellings() {
        assert_eq!(
            parse_box_annotation("Box: 1.5, 2.5, 3.5"),
            Some(Vector3::new(1.5, 2.5, 3.5))
        );
        assert_eq!(parse_box_annotation("i = 0, time = 1.0"), None);
        assert_eq!(parse_box_annotation("box = 1.0 2.0"), None);
    }
}
