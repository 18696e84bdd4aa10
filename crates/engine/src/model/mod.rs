//! The model: workbook, evaluation, history and collaboration behind one
//! command-dispatch entry point.
//!
//! Every change goes through [`Model::dispatch`]. A command is validated
//! against the current state before anything is touched; its inverse is
//! generated from the same state; then it is applied and the affected cells
//! are re-evaluated.

mod getters;
mod handlers;
mod validate;

use std::rc::Rc;

use crate::cell_id::{CellId, SheetId};
use crate::collaboration::{Session, SessionUpdate, TransportService};
use crate::commands::{CancelledReason, Command, CommandKind, DispatchResult};
use crate::evaluator::{EvalEnv, Evaluator};
use crate::events::{EventCollector, JobEvent, ModelEvent};
use crate::formula::functions::{FunctionDefinition, FunctionRegistry};
use crate::formula::tokenizer::canonicalize_formula;
use crate::formula::value::Value;
use crate::history::{History, Revision};
use crate::inverse::{InverseFn, InverseRegistry};
use crate::jobs::{Job, JobQueue, JobStatus, RecomputeJob};
use crate::recalc::{RecalcMode, RecalcReport};
use crate::services::Services;
use crate::settings::EngineSettings;
use crate::workbook::Workbook;

/// Name of the sheet a new model starts with.
const FIRST_SHEET_NAME: &str = "Sheet1";

/// What applying commands requires from evaluation.
#[derive(Debug, Default)]
pub(crate) struct Effect {
    /// Positions whose content changed
    pub changed: Vec<CellId>,
    /// Sheets, dimensions or merges changed: rebuild the graph and
    /// recompute everything
    pub structural: bool,
}

impl Effect {
    fn is_empty(&self) -> bool {
        !self.structural && self.changed.is_empty()
    }
}

pub struct Model {
    settings: EngineSettings,
    services: Services,
    workbook: Workbook,
    functions: FunctionRegistry,
    evaluator: Evaluator,
    inverses: InverseRegistry,
    history: History,
    events: EventCollector,
    jobs: JobQueue,
    session: Option<Session>,
    last_report: Option<RecalcReport>,

    /// Report being accumulated by a chunked recompute
    pending_report: Option<RecalcReport>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Model with default settings, random ids and one empty sheet.
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default(), Services::default())
    }

    /// Model with one empty sheet of the configured default size.
    pub fn with_settings(settings: EngineSettings, services: Services) -> Self {
        let mut model = Self::empty(settings, services);
        let id = SheetId::new(model.services.uid.next_id());
        model.workbook.create_sheet(
            id,
            FIRST_SHEET_NAME,
            0,
            model.settings.default_rows,
            model.settings.default_cols,
        );
        model
    }

    /// Model without sheets, for loading.
    pub(crate) fn empty(settings: EngineSettings, services: Services) -> Self {
        let max_history = settings.max_history;
        Self {
            settings,
            services,
            workbook: Workbook::new(),
            functions: FunctionRegistry::with_builtins(),
            evaluator: Evaluator::new(),
            inverses: InverseRegistry::with_defaults(),
            history: History::new(max_history),
            events: EventCollector::new(),
            jobs: JobQueue::new(),
            session: None,
            last_report: None,
            pending_report: None,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Direct workbook access for loading; bypasses history and evaluation.
    pub(crate) fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }

    /// Add or replace a function. Existing formulas pick it up on the next
    /// evaluation of their cell.
    pub fn register_function(&mut self, definition: FunctionDefinition) {
        self.functions.register(definition);
    }

    /// Add or replace the inverse generator of a command kind.
    pub fn register_inverse(&mut self, kind: CommandKind, generator: InverseFn) {
        self.inverses.register(kind, generator);
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Validate and apply one command, recording it as one revision.
    pub fn dispatch(&mut self, command: Command) -> DispatchResult {
        match command {
            Command::RequestUndo => self.undo(),
            Command::RequestRedo => self.redo(),
            command => self.dispatch_batch(vec![command]),
        }
    }

    /// Set cell content typed in the display locale. Formulas are stored
    /// in the canonical locale.
    pub fn update_cell_localized(&mut self, sheet: &SheetId, row: usize, col: usize, text: &str) -> DispatchResult {
        let content = canonicalize_formula(text, &self.settings.locale);
        self.dispatch(Command::update_content(sheet.clone(), row, col, content))
    }

    /// Apply several commands as one revision. If any command is refused,
    /// the ones already applied are reverted and the refusal is returned.
    pub fn dispatch_batch(&mut self, commands: Vec<Command>) -> DispatchResult {
        if commands.iter().any(Command::is_history_request) {
            return DispatchResult::cancelled(vec![CancelledReason::NotBatchable]);
        }
        if commands.is_empty() {
            return DispatchResult::success();
        }
        let inverses = match self.apply_all(&commands) {
            Ok(inverses) => inverses,
            Err(reasons) => return DispatchResult::cancelled(reasons),
        };
        let revision = Revision {
            id: self.services.uid.next_id(),
            commands,
            inverses,
        };
        self.events.push(ModelEvent::RevisionAdded {
            revision_id: revision.id.clone(),
        });
        self.broadcast(&revision.id, revision.commands.clone());
        self.history.record(revision);
        DispatchResult::success()
    }

    /// Validate, invert and apply each command in turn, then re-evaluate.
    /// Returns the inverses in application order.
    fn apply_all(&mut self, commands: &[Command]) -> Result<Vec<Command>, Vec<CancelledReason>> {
        let mut applied: Vec<Vec<Command>> = Vec::with_capacity(commands.len());
        let mut effect = Effect::default();
        for command in commands {
            let reasons = self.allow_dispatch(command);
            if !reasons.is_empty() {
                log::debug!("{:?} refused: {:?}", command.kind(), reasons);
                for inverse in applied.iter().rev().flatten() {
                    self.apply(inverse, &mut effect);
                }
                self.refresh(effect);
                return Err(reasons);
            }
            let inverse = self.inverses.inverse_of(command, &self.workbook);
            self.apply(command, &mut effect);
            applied.push(inverse);
        }
        self.refresh(effect);
        Ok(applied.into_iter().rev().flatten().collect())
    }

    /// Re-evaluate after commands were applied.
    pub(crate) fn refresh(&mut self, effect: Effect) {
        if effect.is_empty() {
            return;
        }
        if effect.structural {
            self.workbook.rebuild_dependencies();
            self.run_job(Box::new(RecomputeJob::new(self.settings.job_chunk_size)));
        } else {
            self.evaluator.mark_changed(self.workbook.dep_graph(), &effect.changed);
            let (report, _) = self.evaluator.evaluate(self.env(), RecalcMode::Incremental, None);
            self.finish_report(report);
        }
    }

    fn env(&self) -> EvalEnv<'_> {
        EvalEnv {
            workbook: &self.workbook,
            functions: &self.functions,
            external: &self.services.external,
        }
    }

    fn finish_report(&mut self, report: RecalcReport) {
        log::debug!("{}", report.log_line());
        self.events.push(ModelEvent::Evaluated {
            cells: report.cells_evaluated,
            cycles: report.cycle_cells,
        });
        self.last_report = Some(report);
    }

    // =========================================================================
    // History
    // =========================================================================

    fn undo(&mut self) -> DispatchResult {
        let Some(revision) = self.history.take_undo() else {
            return DispatchResult::cancelled(vec![CancelledReason::EmptyUndoStack]);
        };
        let mut effect = Effect {
            changed: Vec::new(),
            structural: true,
        };
        for command in &revision.inverses {
            self.apply(command, &mut effect);
        }
        self.refresh(effect);

        let broadcast_id = self.services.uid.next_id();
        self.broadcast(&broadcast_id, revision.inverses.clone());
        self.events.push(ModelEvent::Undone {
            revision_id: revision.id.clone(),
        });
        self.history.undone(revision);
        DispatchResult::success()
    }

    fn redo(&mut self) -> DispatchResult {
        let Some(revision) = self.history.take_redo() else {
            return DispatchResult::cancelled(vec![CancelledReason::EmptyRedoStack]);
        };
        match self.apply_all(&revision.commands) {
            Ok(inverses) => {
                let revision = Revision { inverses, ..revision };
                let broadcast_id = self.services.uid.next_id();
                self.broadcast(&broadcast_id, revision.commands.clone());
                self.events.push(ModelEvent::Redone {
                    revision_id: revision.id.clone(),
                });
                self.history.redone(revision);
                DispatchResult::success()
            }
            Err(reasons) => {
                self.history.undone(revision);
                DispatchResult::cancelled(reasons)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // =========================================================================
    // Collaboration
    // =========================================================================

    /// Join a session as `client_id`. Local revisions are broadcast from now
    /// on; incoming ones are applied by [`Model::receive_remote`].
    pub fn join_session(&mut self, client_id: impl Into<String>, transport: Rc<dyn TransportService>) {
        if let Some(previous) = self.session.take() {
            previous.leave();
        }
        self.session = Some(Session::join(client_id, transport));
    }

    pub fn leave_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.leave();
        }
    }

    fn broadcast(&mut self, revision_id: &str, commands: Vec<Command>) {
        if let Some(session) = &mut self.session {
            session.send_revision(revision_id, commands);
        }
    }

    /// Apply every remote revision that is ready, in author order. Remote
    /// revisions do not enter the local undo history. Returns the number of
    /// revisions applied.
    pub fn receive_remote(&mut self) -> usize {
        let Some(session) = &mut self.session else {
            return 0;
        };
        let updates = session.take_ready();
        let mut applied = 0;
        for update in updates {
            match update {
                SessionUpdate::Revision(revision) => match self.apply_all(&revision.commands) {
                    Ok(_) => {
                        applied += 1;
                        self.events.push(ModelEvent::RemoteRevisionApplied {
                            client_id: revision.client_id,
                            revision_id: revision.revision_id,
                        });
                    }
                    Err(reasons) => log::warn!(
                        "remote revision {} from {} refused: {:?}",
                        revision.revision_id,
                        revision.client_id,
                        reasons
                    ),
                },
                SessionUpdate::ClientLeft(client_id) => {
                    self.events.push(ModelEvent::ClientLeft { client_id });
                }
            }
        }
        applied
    }

    // =========================================================================
    // Jobs and evaluation
    // =========================================================================

    /// Queue a job and run the queue until it is empty.
    pub fn run_job(&mut self, job: Box<dyn Job>) {
        let queued = self.jobs.push(job);
        self.events.push(ModelEvent::Job(queued));
        self.run_jobs();
    }

    fn run_jobs(&mut self) {
        while let Some(mut entry) = self.jobs.pop() {
            let name = entry.job.name().to_string();
            if !entry.started {
                entry.started = true;
                self.events.push(ModelEvent::Job(JobEvent::Started {
                    id: entry.id,
                    name: name.clone(),
                }));
            }
            match entry.job.step(self) {
                JobStatus::Continue => {
                    self.events.push(ModelEvent::Job(JobEvent::Continued { id: entry.id, name }));
                    self.jobs.resume(entry);
                }
                JobStatus::Done => {
                    log::info!("job {} ({}) done", entry.id, name);
                    self.events.push(ModelEvent::Job(JobEvent::Done { id: entry.id, name }));
                }
            }
        }
    }

    /// One step of a full recompute: on the first step every value is
    /// dropped and every formula marked dirty. Returns the number of cells
    /// still dirty.
    pub(crate) fn recompute_chunk(&mut self, first: bool, chunk_size: usize) -> usize {
        if first {
            self.evaluator.reset(&self.workbook);
            self.services.external.clear_readers();
            self.pending_report = None;
        }
        let (report, remaining) = self
            .evaluator
            .evaluate(self.env(), RecalcMode::Full, Some(chunk_size));
        let mut total = self.pending_report.take().unwrap_or_else(|| RecalcReport::new(RecalcMode::Full));
        total.merge(report);
        if remaining == 0 {
            self.finish_report(total);
        } else {
            self.pending_report = Some(total);
        }
        remaining
    }

    /// Rebuild the dependency graph and re-evaluate every formula.
    pub fn recompute(&mut self) {
        self.workbook.rebuild_dependencies();
        self.run_job(Box::new(RecomputeJob::new(self.settings.job_chunk_size)));
    }

    /// Report of the last evaluation pass.
    pub fn last_report(&self) -> Option<&RecalcReport> {
        self.last_report.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        self.events.drain()
    }

    // =========================================================================
    // External data
    // =========================================================================

    /// Keys requested by formulas and not yet supplied, sorted.
    pub fn pending_external_requests(&self) -> Vec<String> {
        self.services.external.pending_keys()
    }

    /// Supply an external value and re-evaluate the cells waiting for it.
    pub fn resolve_external(&mut self, key: &str, value: Value) {
        let readers = self.services.external.resolve(key, value);
        self.events.push(ModelEvent::ExternalResolved { key: key.to_string() });
        self.refresh(Effect {
            changed: readers,
            structural: false,
        });
    }
}
