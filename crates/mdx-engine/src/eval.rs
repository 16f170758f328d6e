//! Evaluation context: the current-member vector, the LIFO frame stack, the
//! slicer pins and the per-execution memo cache.

use crate::calc::{Calc, DependencyList, EvalResult, Tuple};
use crate::cell::CellReader;
use crate::config::{AlertPolicy, EvalConfig};
use crate::error::{EngineError, EngineResult};
use ahash::{AHashMap, AHashSet};
use mdx_model::{CatalogView, CellValue, Member, MemberId};
use smallvec::SmallVec;

type Snapshot = SmallVec<[MemberId; 8]>;

/// Counters exposed for diagnostics; every evaluation updates them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Memoized results answered from the cache.
    pub memo_hits: usize,
    /// Memoized nodes actually recomputed.
    pub memo_misses: usize,
    /// Cell coordinates read from the aggregate store.
    pub cells_read: usize,
    /// Compound-slicer ambiguity warnings emitted (at most one per hierarchy).
    pub slicer_warnings: usize,
}

/// Mutable evaluation state for one execution over a catalog.
///
/// The context holds exactly one current member per hierarchy at all times;
/// overrides are recorded in frames and unwound in reverse order on pop, so
/// nested scopes restore precisely what they shadowed.
pub struct Evaluator<'a> {
    catalog: &'a dyn CatalogView,
    cells: &'a dyn CellReader,
    config: EvalConfig,
    context: Vec<MemberId>,
    override_depth: Vec<u32>,
    frames: Vec<SmallVec<[(usize, MemberId); 4]>>,
    slicer_pins: AHashMap<usize, Vec<MemberId>>,
    warned_slicers: AHashSet<usize>,
    memo: AHashMap<(usize, Snapshot), EvalResult>,
    stats: EvalStats,
}

impl std::fmt::Debug for Evaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<'a> Evaluator<'a> {
    /// Build an evaluator with every hierarchy at its default member.
    /// A hierarchy without a default member cannot participate in a context
    /// and fails construction.
    pub fn new(
        catalog: &'a dyn CatalogView,
        cells: &'a dyn CellReader,
        config: EvalConfig,
    ) -> EngineResult<Self> {
        let mut context = Vec::with_capacity(catalog.hierarchy_count());
        for ordinal in 0..catalog.hierarchy_count() {
            let member = catalog.default_member(ordinal).ok_or_else(|| {
                EngineError::NoDefaultMember {
                    hierarchy: catalog
                        .hierarchy(ordinal)
                        .map(|h| h.name.clone())
                        .unwrap_or_else(|| ordinal.to_string()),
                }
            })?;
            context.push(member);
        }
        let hierarchies = context.len();
        Ok(Self {
            catalog,
            cells,
            config,
            context,
            override_depth: vec![0; hierarchies],
            frames: Vec::new(),
            slicer_pins: AHashMap::new(),
            warned_slicers: AHashSet::new(),
            memo: AHashMap::new(),
            stats: EvalStats::default(),
        })
    }

    pub fn catalog(&self) -> &'a dyn CatalogView {
        self.catalog
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn stats(&self) -> EvalStats {
        self.stats
    }

    pub(crate) fn member(&self, id: MemberId) -> EngineResult<&'a Member> {
        self.catalog
            .member(id)
            .ok_or_else(|| EngineError::Type(format!("member #{} is not in the catalog", id.index())))
    }

    /// Current member of a hierarchy, ignoring slicer ambiguity.
    pub fn current_member(&self, ordinal: usize) -> MemberId {
        debug_assert!(ordinal < self.context.len(), "hierarchy ordinal out of range");
        self.context[ordinal]
    }

    /// Current member of a hierarchy, applying the compound-slicer alert
    /// policy when more than one member is pinned on it.
    ///
    /// A frame override supersedes the slicer: while set iteration or a tuple
    /// coordinate pins the hierarchy, exactly one member is current and the
    /// policy does not fire.
    pub fn current_member_checked(&mut self, ordinal: usize) -> EngineResult<MemberId> {
        if self.override_depth[ordinal] == 0 {
            let ambiguous = self
                .slicer_pins
                .get(&ordinal)
                .filter(|pins| pins.len() > 1)
                .map(|pins| (pins[0], pins.len()));
            if let Some((first, members)) = ambiguous {
                match self.config.slicer_alert {
                    AlertPolicy::Ignore => return Ok(first),
                    AlertPolicy::Warn => {
                        if self.warned_slicers.insert(ordinal) {
                            self.stats.slicer_warnings += 1;
                            let name = self
                                .catalog
                                .hierarchy(ordinal)
                                .map_or("?", |h| h.name.as_str());
                            log::warn!(
                                "hierarchy {name} has {members} members in the slicer \
                                 context; using the first"
                            );
                        }
                        return Ok(first);
                    }
                    AlertPolicy::Raise => {
                        return Err(EngineError::AmbiguousCurrentMember {
                            hierarchy: self
                                .catalog
                                .hierarchy(ordinal)
                                .map(|h| h.name.clone())
                                .unwrap_or_else(|| ordinal.to_string()),
                            members,
                        });
                    }
                }
            }
        }
        Ok(self.current_member(ordinal))
    }

    /// Pin slicer members on a hierarchy before evaluation. A single member
    /// sets the context outright; several record an ambiguity that the
    /// configured alert policy arbitrates at access time.
    pub fn pin_slicer(&mut self, members: &[MemberId]) -> EngineResult<()> {
        let Some(first) = members.first() else {
            return Ok(());
        };
        let ordinal = self.member(*first)?.hierarchy;
        for id in &members[1..] {
            if self.member(*id)?.hierarchy != ordinal {
                return Err(EngineError::Type(
                    "slicer members must share a hierarchy".to_string(),
                ));
            }
        }
        debug_assert!(self.frames.is_empty(), "slicer pinned inside a scope");
        self.context[ordinal] = *first;
        self.slicer_pins.insert(ordinal, members.to_vec());
        Ok(())
    }

    /// Open a context scope. Every override recorded until the matching
    /// [`pop_frame`](Self::pop_frame) is undone there.
    pub fn push_frame(&mut self) {
        self.frames.push(SmallVec::new());
    }

    /// Close the innermost scope, restoring shadowed members in reverse
    /// order of overriding.
    pub fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for (ordinal, previous) in frame.into_iter().rev() {
                self.context[ordinal] = previous;
                self.override_depth[ordinal] -= 1;
            }
        } else {
            debug_assert!(false, "pop without a matching push");
        }
    }

    /// Override the current member of the member's own hierarchy, recording
    /// the shadowed member in the innermost frame.
    pub fn set_context(&mut self, member: MemberId) -> EngineResult<()> {
        let ordinal = self.member(member)?.hierarchy;
        debug_assert!(!self.frames.is_empty(), "context override outside a frame");
        if let Some(frame) = self.frames.last_mut() {
            frame.push((ordinal, self.context[ordinal]));
            self.override_depth[ordinal] += 1;
        }
        self.context[ordinal] = member;
        Ok(())
    }

    /// Run `body` with the tuple's members pinned in a fresh frame; the frame
    /// is popped on every exit path.
    pub fn with_tuple<R>(
        &mut self,
        tuple: &Tuple,
        body: impl FnOnce(&mut Self) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.push_frame();
        let mut pinned = Ok(());
        for member in tuple {
            if let Err(err) = self.set_context(*member) {
                pinned = Err(err);
                break;
            }
        }
        let result = match pinned {
            Ok(()) => body(self),
            Err(err) => Err(err),
        };
        self.pop_frame();
        result
    }

    /// Read the cell addressed by the full current context: the measure is
    /// the current member of the measures hierarchy, and every other
    /// hierarchy contributes one column constraint per ancestor level of its
    /// current member.
    pub fn read_current_cell(&mut self) -> EngineResult<CellValue> {
        let measure_member = self.current_member_checked(0)?;
        let measure = self.catalog.measure_for_member(measure_member).ok_or_else(|| {
            EngineError::Type(format!(
                "current member of the measures hierarchy is not a measure: {}",
                self.member(measure_member).map_or("?", |m| m.name.as_str())
            ))
        })?;

        let catalog = self.catalog;
        let mut constraints: Vec<(String, CellValue)> = Vec::new();
        for ordinal in 1..self.context.len() {
            let Some(hierarchy) = catalog.hierarchy(ordinal) else {
                continue;
            };
            let mut cursor = Some(self.current_member_checked(ordinal)?);
            while let Some(id) = cursor {
                let member = self.member(id)?;
                if let Some(level) = hierarchy.levels.get(member.depth) {
                    constraints.push((level.column.clone(), member.key.clone()));
                }
                cursor = member.parent;
            }
        }

        self.stats.cells_read += 1;
        match self.cells.read(measure, &constraints)? {
            Some(value) => Ok(value.into()),
            None => Ok(CellValue::Blank),
        }
    }

    /// Snapshot of the current members of the given hierarchies; the memo key.
    pub(crate) fn snapshot(&self, depends: &DependencyList) -> Snapshot {
        depends
            .iter()
            .map(|&ordinal| self.context[ordinal as usize])
            .collect()
    }

    pub(crate) fn memo_get(&mut self, id: usize, snapshot: &Snapshot) -> Option<EvalResult> {
        let hit = self.memo.get(&(id, snapshot.clone())).cloned();
        if hit.is_some() {
            self.stats.memo_hits += 1;
        }
        hit
    }

    pub(crate) fn memo_put(&mut self, id: usize, snapshot: Snapshot, value: EvalResult) {
        self.stats.memo_misses += 1;
        self.memo.insert((id, snapshot), value);
    }
}

impl Drop for Evaluator<'_> {
    fn drop(&mut self) {
        if self.stats != EvalStats::default() {
            log::debug!(
                "evaluation finished: {} memo hit(s), {} recompute(s), {} cell(s) read",
                self.stats.memo_hits,
                self.stats.memo_misses,
                self.stats.cells_read
            );
        }
    }
}

/// Evaluate a compiled calculation tree against an evaluator.
pub fn evaluate(node: &Calc, ev: &mut Evaluator<'_>) -> EngineResult<EvalResult> {
    node.evaluate(ev)
}
