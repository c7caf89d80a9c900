//! Debugger session over a recorded run
//!
//! A [`Session`] owns the recording, the current stop and selected frame,
//! and one view per variable it has been asked about. Each view keeps the
//! provider bound to that variable for as long as the variable's location
//! and type stay the same; moving between stops and switching frames
//! deliver the provider lifecycle events so no cached result outlives the
//! memory it was read from.

use crate::config::SessionConfig;
use crate::debuggee::{self, DebuggeeError, Frame, Recording, StdLib, Variable};
use crate::formatters::{
    provider_for, ContainerHandle, FormatterError, Interrupt, SyntheticChildrenProvider, ValueRef,
};
use crate::memory::{Address, MemoryAccessor};
use crate::render::{format_variable, ValueNode, ValueRenderer};
use crate::snapshot::Snapshot;
use crate::types::{TypeRef, TypeRegistry};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no variable named '{0}' in the selected frame")]
    NoSuchVariable(String),

    #[error("process exited")]
    ProcessExited,

    #[error("already at the first stop")]
    AtStart,

    #[error("invalid frame index {index} ({count} frames)")]
    InvalidFrame { index: usize, count: usize },

    #[error("cannot evaluate '{0}'")]
    BadExpression(String),

    #[error(transparent)]
    Formatter(#[from] FormatterError),

    #[error(transparent)]
    Debuggee(#[from] DebuggeeError),

    #[error("no snapshot recorded for stop {0}")]
    MissingSnapshot(usize),
}

/// A variable the session has rendered, with its bound provider
struct VariableView {
    address: Address,
    ty: TypeRef,
    provider: Option<Box<dyn SyntheticChildrenProvider>>,
}

impl VariableView {
    fn describes(&self, variable: &Variable) -> bool {
        self.address == variable.address && Rc::ptr_eq(&self.ty, &variable.ty)
    }
}

pub struct Session {
    recording: Recording,
    config: SessionConfig,
    position: usize,
    selected_frame: usize,
    views: FxHashMap<(usize, String), VariableView>,
    interrupt: Interrupt,
}

impl Session {
    /// Record the sample program and stop at its first breakpoint
    pub fn launch(config: SessionConfig) -> Result<Self, SessionError> {
        let recording = debuggee::record(config.library, config.snapshot_memory_limit)?;
        Ok(Self::from_recording(recording, config))
    }

    pub fn from_recording(recording: Recording, config: SessionConfig) -> Self {
        info!(
            library = %recording.library,
            stops = recording.history.len(),
            "session started"
        );
        Session {
            recording,
            config,
            position: 0,
            selected_frame: 0,
            views: FxHashMap::default(),
            interrupt: Interrupt::new(),
        }
    }

    /// Move to the next stop, returning its line
    pub fn continue_to_breakpoint(&mut self) -> Result<usize, SessionError> {
        self.resume();
        if self.position + 1 >= self.recording.history.len() {
            return Err(SessionError::ProcessExited);
        }
        self.position += 1;
        self.selected_frame = 0;
        self.stopped()
    }

    /// Move back to the previous stop, returning its line
    pub fn reverse_continue(&mut self) -> Result<usize, SessionError> {
        self.resume();
        if self.position == 0 {
            return Err(SessionError::AtStart);
        }
        self.position -= 1;
        self.selected_frame = 0;
        self.stopped()
    }

    pub fn select_frame(&mut self, index: usize) -> Result<(), SessionError> {
        let count = self.snapshot()?.frames.len();
        if index >= count {
            return Err(SessionError::InvalidFrame { index, count });
        }
        self.selected_frame = index;
        for view in self.views.values_mut() {
            if let Some(provider) = view.provider.as_mut() {
                provider.on_frame_change();
            }
        }
        debug!(frame = index, "frame selected");
        Ok(())
    }

    pub fn frames(&self) -> &[Frame] {
        self.recording
            .history
            .get(self.position)
            .map(|s| s.frames.as_slice())
            .unwrap_or_default()
    }

    pub fn selected_frame(&self) -> usize {
        self.selected_frame
    }

    /// Variables of the selected frame
    pub fn variables(&self) -> &[Variable] {
        self.frames()
            .get(self.selected_frame)
            .map(|f| f.variables.as_slice())
            .unwrap_or_default()
    }

    /// Evaluate `name` or `name[index]` in the selected frame
    pub fn evaluate(&mut self, expr: &str, expand: bool) -> Result<ValueNode, SessionError> {
        let (name, index) = parse_expression(expr)?;
        let snapshot = self
            .recording
            .history
            .get(self.position)
            .ok_or(SessionError::MissingSnapshot(self.position))?;
        let variable = lookup(snapshot, self.selected_frame, name)?;
        let view = bind(
            &mut self.views,
            &self.recording.registry,
            &self.config,
            &self.interrupt,
            self.selected_frame,
            variable,
        );
        let renderer = ValueRenderer::new(
            &snapshot.image,
            &self.recording.registry,
            self.config.formatter,
            &self.interrupt,
        );
        let value = ValueRef::new(variable.address, &variable.ty);

        match index {
            None => Ok(match view.provider.as_deref_mut() {
                Some(provider) => renderer.render_synthetic(name, &value, provider, expand),
                None => renderer.render(name, &value, expand),
            }),
            Some(index) => {
                let provider = view
                    .provider
                    .as_deref_mut()
                    .ok_or_else(|| SessionError::BadExpression(expr.to_string()))?;
                let child = provider.child_at(&snapshot.image, index)?;
                Ok(renderer.render(&format!("{}[{}]", name, index), &child.value, expand))
            }
        }
    }

    /// `frame variable <expr>` output
    pub fn frame_variable(&mut self, expr: &str) -> Result<String, SessionError> {
        Ok(format_variable(&self.evaluate(expr, true)?))
    }

    /// `frame variable` output for every variable of the selected frame
    pub fn frame_variables(&mut self) -> Result<String, SessionError> {
        let names: Vec<String> = self.variables().iter().map(|v| v.name.clone()).collect();
        let mut lines = Vec::with_capacity(names.len());
        for name in names {
            lines.push(self.frame_variable(&name)?);
        }
        Ok(lines.join("\n"))
    }

    /// Whether the variable should offer an expand affordance
    pub fn might_have_children(&mut self, name: &str) -> Result<bool, SessionError> {
        let snapshot = self
            .recording
            .history
            .get(self.position)
            .ok_or(SessionError::MissingSnapshot(self.position))?;
        let variable = lookup(snapshot, self.selected_frame, name)?;
        let view = bind(
            &mut self.views,
            &self.recording.registry,
            &self.config,
            &self.interrupt,
            self.selected_frame,
            variable,
        );
        Ok(match view.provider.as_mut() {
            Some(provider) => provider.might_have_children(&snapshot.image),
            None => !variable.ty.fields().is_empty(),
        })
    }

    /// Handle for cancelling a traversal in progress
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn stop_line(&self) -> usize {
        self.recording
            .history
            .get(self.position)
            .map(|s| s.line)
            .unwrap_or_default()
    }

    /// Zero-based index of the current stop
    pub fn stop_index(&self) -> usize {
        self.position
    }

    pub fn total_stops(&self) -> usize {
        self.recording.history.len()
    }

    pub fn source(&self) -> &'static str {
        self.recording.source
    }

    pub fn library(&self) -> StdLib {
        self.recording.library
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bytes of snapshot history held
    pub fn history_usage(&self) -> usize {
        self.recording.history.memory_usage()
    }

    /// Raw memory of the current stop
    pub fn memory(&self) -> Option<&dyn MemoryAccessor> {
        self.recording
            .history
            .get(self.position)
            .map(|s| &s.image as &dyn MemoryAccessor)
    }

    fn snapshot(&self) -> Result<&Snapshot, SessionError> {
        self.recording
            .history
            .get(self.position)
            .ok_or(SessionError::MissingSnapshot(self.position))
    }

    fn resume(&mut self) {
        self.interrupt.clear();
        for view in self.views.values_mut() {
            if let Some(provider) = view.provider.as_mut() {
                provider.on_process_resume();
            }
        }
        debug!(views = self.views.len(), "process resumed");
    }

    fn stopped(&self) -> Result<usize, SessionError> {
        let line = self.snapshot()?.line;
        info!(stop = self.position + 1, line, "stopped at breakpoint");
        Ok(line)
    }
}

fn lookup<'s>(
    snapshot: &'s Snapshot,
    frame: usize,
    name: &str,
) -> Result<&'s Variable, SessionError> {
    let count = snapshot.frames.len();
    snapshot
        .frames
        .get(frame)
        .ok_or(SessionError::InvalidFrame { index: frame, count })?
        .variable(name)
        .ok_or_else(|| SessionError::NoSuchVariable(name.to_string()))
}

/// The view for `variable`, rebinding its provider if the variable moved
fn bind<'v>(
    views: &'v mut FxHashMap<(usize, String), VariableView>,
    registry: &TypeRegistry,
    config: &SessionConfig,
    interrupt: &Interrupt,
    frame: usize,
    variable: &Variable,
) -> &'v mut VariableView {
    let key = (frame, variable.name.clone());
    let stale = views.get(&key).is_some_and(|view| !view.describes(variable));
    if stale {
        debug!(name = %variable.name, "variable changed location or type, rebinding");
        views.remove(&key);
    }
    views.entry(key).or_insert_with(|| {
        let handle = ContainerHandle::new(variable.name.clone(), variable.address, &variable.ty);
        VariableView {
            address: variable.address,
            ty: variable.ty.clone(),
            provider: provider_for(registry, handle, config.formatter, interrupt),
        }
    })
}

fn parse_expression(expr: &str) -> Result<(&str, Option<usize>), SessionError> {
    let expr = expr.trim();
    let bad = || SessionError::BadExpression(expr.to_string());
    let (name, index) = match expr.split_once('[') {
        None => (expr, None),
        Some((name, rest)) => {
            let index = rest
                .strip_suffix(']')
                .ok_or_else(bad)?
                .trim()
                .parse::<usize>()
                .map_err(|_| bad())?;
            (name.trim(), Some(index))
        }
    };
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(bad());
    }
    Ok((name, index))
}
