//! The sample program
//!
//! [`record`] runs the program below against a chosen library layout and
//! captures a [`Snapshot`] at every line marked as a breakpoint. The result
//! is the whole history a session can move through.

use super::stdlib::{IterPosition, TargetMap, ValueKind};
use super::{DebuggeeError, Frame, StdLib, TargetValue, Variable};
use crate::memory::{Address, ProcessImage, Region};
use crate::snapshot::{Snapshot, SnapshotManager};
use crate::types::{TypeRef, TypeRegistry};
use tracing::{debug, info};

/// Marks the lines a stop is recorded at
pub const BREAKPOINT_MARKER: &str = "// Set break point at this line.";

pub const SAMPLE_SOURCE: &str = r#"#include <map>
#include <string>

#define intint_map std::map<int, int>
#define strint_map std::map<std::string, int>
#define intstr_map std::map<int, std::string>
#define strstr_map std::map<std::string, std::string>

int g_the_foo = 0;

int thefoo_rw(int arg = 1) {
  if (arg < 0)
    arg = 0;
  if (!arg)
    arg = 1;
  g_the_foo += arg;
  return g_the_foo;
}

int main() {
  intint_map ii;
  intint_map::iterator it, it_end;
  intint_map::const_iterator const_it, const_it_end;
  strint_map si;
  intstr_map is;
  strstr_map ss;

  ii[0] = 0; // Set break point at this line.
  ii[1] = 1;
  thefoo_rw(1); // Set break point at this line.
  ii[2] = 0;
  ii[3] = 1;
  thefoo_rw(1); // Set break point at this line.
  ii[4] = 0;
  ii[5] = 1;
  ii[6] = 0;
  ii[7] = 1;
  it = ii.begin();
  const_it = ii.cbegin();
  it_end = ii.end();
  const_it_end = ii.cend();
  ii.clear(); // Set break point at this line.

  thefoo_rw(1); // Set break point at this line.
  si["zero"] = 0;
  thefoo_rw(1); // Set break point at this line.
  si["one"] = 1;
  si["two"] = 2;
  si["three"] = 3;
  thefoo_rw(1); // Set break point at this line.
  si.clear();
  thefoo_rw(1); // Set break point at this line.

  is[85] = "goofy"; // Set break point at this line.
  is[1] = "is";
  is[2] = "smart";
  is[3] = "!!!";
  thefoo_rw(1); // Set break point at this line.
  is.clear();
  thefoo_rw(1); // Set break point at this line.

  ss["ciao"] = "hello"; // Set break point at this line.
  ss["casa"] = "house";
  ss["gatto"] = "cat";
  thefoo_rw(1); // Set break point at this line.
  ss.clear();
  thefoo_rw(1); // Set break point at this line.

  return 0;
}
"#;

/// Line numbers (1-based) of every breakpoint marker, in order
pub fn breakpoint_lines() -> Vec<usize> {
    SAMPLE_SOURCE
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(BREAKPOINT_MARKER))
        .map(|(i, _)| i + 1)
        .collect()
}

/// A recorded run: static type information plus one snapshot per stop
#[derive(Debug)]
pub struct Recording {
    pub library: StdLib,
    pub registry: TypeRegistry,
    pub history: SnapshotManager,
    pub source: &'static str,
}

struct Program {
    image: ProcessImage,
    ii: TargetMap,
    si: TargetMap,
    is: TargetMap,
    ss: TargetMap,
    it: Address,
    const_it: Address,
    it_end: Address,
    const_it_end: Address,
    variables: Vec<Variable>,
}

impl Program {
    fn start(library: StdLib, registry: &mut TypeRegistry) -> Result<Self, DebuggeeError> {
        let mut image = ProcessImage::default();
        let mut variables = Vec::new();
        let mut declare = |name: &str, address: Address, ty: &TypeRef| {
            variables.push(Variable {
                name: name.to_string(),
                address,
                ty: ty.clone(),
            });
        };

        let ii = TargetMap::create(&mut image, registry, library, ValueKind::Int, ValueKind::Int)?;
        declare("ii", ii.address, &ii.types.map);
        let iterator = |image: &mut ProcessImage, ty: &TypeRef| {
            image.allocate(Region::Stack, ty.size as usize, ty.align)
        };
        let it = iterator(&mut image, &ii.types.iterator)?;
        let it_end = iterator(&mut image, &ii.types.iterator)?;
        let const_it = iterator(&mut image, &ii.types.const_iterator)?;
        let const_it_end = iterator(&mut image, &ii.types.const_iterator)?;
        declare("it", it, &ii.types.iterator);
        declare("const_it", const_it, &ii.types.const_iterator);
        declare("it_end", it_end, &ii.types.iterator);
        declare("const_it_end", const_it_end, &ii.types.const_iterator);

        let si = TargetMap::create(&mut image, registry, library, ValueKind::String, ValueKind::Int)?;
        declare("si", si.address, &si.types.map);
        let is = TargetMap::create(&mut image, registry, library, ValueKind::Int, ValueKind::String)?;
        declare("is", is.address, &is.types.map);
        let ss =
            TargetMap::create(&mut image, registry, library, ValueKind::String, ValueKind::String)?;
        declare("ss", ss.address, &ss.types.map);

        Ok(Program {
            image,
            ii,
            si,
            is,
            ss,
            it,
            const_it,
            it_end,
            const_it_end,
            variables,
        })
    }

    fn frames(&self, line: usize) -> Vec<Frame> {
        vec![
            Frame {
                function: "main".to_string(),
                line,
                variables: self.variables.clone(),
            },
            Frame {
                function: "__libc_start_call_main".to_string(),
                line: 0,
                variables: Vec::new(),
            },
        ]
    }
}

/// Appends a snapshot at each breakpoint marker in turn
struct Recorder {
    lines: Vec<usize>,
    history: SnapshotManager,
}

impl Recorder {
    fn stop(&mut self, program: &Program) -> Result<(), DebuggeeError> {
        let index = self.history.len();
        let line = *self
            .lines
            .get(index)
            .ok_or(DebuggeeError::MissingBreakpoint(index + 1))?;
        debug!(stop = index + 1, line, "recording stop");
        self.history.push(Snapshot {
            image: program.image.clone(),
            frames: program.frames(line),
            line,
        })?;
        Ok(())
    }
}

fn assign(
    map: &mut TargetMap,
    image: &mut ProcessImage,
    entries: &[(TargetValue, TargetValue)],
) -> Result<(), DebuggeeError> {
    for (key, value) in entries {
        map.insert(image, key.clone(), value.clone())?;
    }
    Ok(())
}

fn entries<K: Into<TargetValue> + Copy, V: Into<TargetValue> + Copy>(
    pairs: &[(K, V)],
) -> Vec<(TargetValue, TargetValue)> {
    pairs.iter().map(|&(k, v)| (k.into(), v.into())).collect()
}

/// Run the sample program against `library`, recording every stop
pub fn record(library: StdLib, memory_limit: usize) -> Result<Recording, DebuggeeError> {
    let mut registry = TypeRegistry::new();
    let mut p = Program::start(library, &mut registry)?;
    let mut rec = Recorder {
        lines: breakpoint_lines(),
        history: SnapshotManager::new(memory_limit),
    };

    rec.stop(&p)?;
    assign(&mut p.ii, &mut p.image, &entries(&[(0, 0), (1, 1)]))?;
    rec.stop(&p)?;
    assign(&mut p.ii, &mut p.image, &entries(&[(2, 0), (3, 1)]))?;
    rec.stop(&p)?;
    assign(
        &mut p.ii,
        &mut p.image,
        &entries(&[(4, 0), (5, 1), (6, 0), (7, 1)]),
    )?;
    for (at, position) in [
        (p.it, IterPosition::Begin),
        (p.const_it, IterPosition::Begin),
        (p.it_end, IterPosition::End),
        (p.const_it_end, IterPosition::End),
    ] {
        p.ii.write_iterator(&mut p.image, at, position)?;
    }
    rec.stop(&p)?;
    p.ii.clear(&mut p.image)?;

    rec.stop(&p)?;
    assign(&mut p.si, &mut p.image, &entries(&[("zero", 0)]))?;
    rec.stop(&p)?;
    assign(
        &mut p.si,
        &mut p.image,
        &entries(&[("one", 1), ("two", 2), ("three", 3)]),
    )?;
    rec.stop(&p)?;
    p.si.clear(&mut p.image)?;
    rec.stop(&p)?;

    rec.stop(&p)?;
    assign(
        &mut p.is,
        &mut p.image,
        &entries(&[(85, "goofy"), (1, "is"), (2, "smart"), (3, "!!!")]),
    )?;
    rec.stop(&p)?;
    p.is.clear(&mut p.image)?;
    rec.stop(&p)?;

    rec.stop(&p)?;
    assign(
        &mut p.ss,
        &mut p.image,
        &entries(&[("ciao", "hello"), ("casa", "house"), ("gatto", "cat")]),
    )?;
    rec.stop(&p)?;
    p.ss.clear(&mut p.image)?;
    rec.stop(&p)?;

    info!(
        library = %library,
        stops = rec.history.len(),
        bytes = rec.history.memory_usage(),
        "recorded sample program"
    );
    Ok(Recording {
        library,
        registry,
        history: rec.history,
        source: SAMPLE_SOURCE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SNAPSHOT_MEMORY_LIMIT;

    #[test]
    fn test_one_marker_per_stop() {
        let lines = breakpoint_lines();
        assert_eq!(lines.len(), 14);
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_record_takes_every_stop() {
        for library in StdLib::ALL {
            let recording = record(library, DEFAULT_SNAPSHOT_MEMORY_LIMIT).unwrap();
            assert_eq!(recording.history.len(), 14, "{}", library);
            let last = recording.history.get(13).unwrap();
            assert_eq!(last.line, *breakpoint_lines().last().unwrap());
            assert!(last.frames[0].variable("ss").is_some());
        }
    }

    #[test]
    fn test_tiny_budget_fails_recording() {
        assert!(matches!(
            record(StdLib::LibStdCxx, 1024),
            Err(DebuggeeError::Snapshot(_))
        ));
    }
}
