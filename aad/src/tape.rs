//! One rewindable reverse-mode tape per thread.

use std::cell::RefCell;

use crate::blocklist::BlockList;
use crate::errors::{AadError, Result};
use crate::node::TapeNode;

const NODE_BLOCK: usize = 16384;
const ADJ_BLOCK: usize = 32768;
const DATA_BLOCK: usize = 65536;

/// Append-only record of every arithmetic operation of one valuation.
///
/// The tape owns four arenas: the nodes themselves, the local derivatives,
/// the child-adjoint addresses and, in multi-output mode, the per-node
/// adjoint vectors. A child's adjoint address is resolved when its parent is
/// recorded: the child's node index in single-output mode, the offset of its
/// adjoint vector otherwise. The reverse sweep therefore writes adjoints
/// directly, without any lookup.
pub struct Tape {
    nodes: BlockList<TapeNode>,
    derivs: BlockList<f64>,
    args: BlockList<usize>,
    adjoints: BlockList<f64>,
    multi: bool,
    num_adjoints: usize,
}

impl Tape {
    pub fn new() -> Self {
        Tape {
            nodes: BlockList::new(NODE_BLOCK),
            derivs: BlockList::new(DATA_BLOCK),
            args: BlockList::new(DATA_BLOCK),
            adjoints: BlockList::new(ADJ_BLOCK),
            multi: false,
            num_adjoints: 1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    #[inline]
    pub fn num_adjoints(&self) -> usize {
        self.num_adjoints
    }

    #[inline]
    pub fn contains(&self, node: usize) -> bool {
        self.nodes.contains(node)
    }

    pub fn node(&self, index: usize) -> &TapeNode {
        self.nodes.get(index)
    }

    /// Switch to `k`-dimensional adjoints. The mode is tape-wide: it must be
    /// set before anything is recorded and holds for every node until the
    /// next `clear`.
    pub fn set_multi(&mut self, k: usize) -> Result<()> {
        if !self.nodes.is_empty() {
            return Err(AadError::TapeNotEmpty);
        }
        self.multi = true;
        self.num_adjoints = k;
        Ok(())
    }

    /// Back to the scalar-adjoint mode. Same emptiness requirement.
    pub fn set_single(&mut self) -> Result<()> {
        if !self.nodes.is_empty() {
            return Err(AadError::TapeNotEmpty);
        }
        self.multi = false;
        self.num_adjoints = 1;
        Ok(())
    }

    /// Where the adjoint(s) of `node` live, as seen by a consumer node.
    #[inline]
    fn adjoint_slot(&self, node: usize) -> usize {
        if self.multi {
            self.nodes.get(node).adjoints_at
        } else {
            node
        }
    }

    fn record(&mut self, n_args: usize) -> usize {
        let derivs_at = self.derivs.push_n(n_args);
        let args_at = self.args.push_n(n_args);
        let adjoints_at = if self.multi {
            self.adjoints.push_n(self.num_adjoints)
        } else {
            0
        };
        self.nodes.push(TapeNode {
            n_args,
            derivs_at,
            args_at,
            adjoint: 0.0,
            adjoints_at,
        })
    }

    /// Record an independent input.
    #[inline]
    pub fn record_leaf(&mut self) -> usize {
        self.record(0)
    }

    /// Record a one-argument operation with local derivative `der`.
    pub fn record_unary(&mut self, arg: usize, der: f64) -> usize {
        let slot = self.adjoint_slot(arg);
        let index = self.record(1);
        let node = *self.nodes.get(index);
        *self.derivs.get_mut(node.derivs_at) = der;
        *self.args.get_mut(node.args_at) = slot;
        index
    }

    /// Record a two-argument operation with local derivatives `lder`, `rder`.
    pub fn record_binary(&mut self, lhs: usize, rhs: usize, lder: f64, rder: f64) -> usize {
        let lslot = self.adjoint_slot(lhs);
        let rslot = self.adjoint_slot(rhs);
        let index = self.record(2);
        let node = *self.nodes.get(index);
        *self.derivs.get_mut(node.derivs_at) = lder;
        *self.derivs.get_mut(node.derivs_at + 1) = rder;
        *self.args.get_mut(node.args_at) = lslot;
        *self.args.get_mut(node.args_at + 1) = rslot;
        index
    }

    /* ── adjoint access ─────────────────────────────────────────────── */

    pub fn adjoint(&self, node: usize) -> f64 {
        debug_assert!(!self.multi);
        self.nodes.get(node).adjoint
    }

    pub fn set_adjoint(&mut self, node: usize, value: f64) {
        debug_assert!(!self.multi);
        self.nodes.get_mut(node).adjoint = value;
    }

    pub fn adjoint_at(&self, node: usize, k: usize) -> f64 {
        debug_assert!(self.multi && k < self.num_adjoints);
        *self.adjoints.get(self.nodes.get(node).adjoints_at + k)
    }

    pub fn set_adjoint_at(&mut self, node: usize, k: usize, value: f64) {
        debug_assert!(self.multi && k < self.num_adjoints);
        let at = self.nodes.get(node).adjoints_at;
        *self.adjoints.get_mut(at + k) = value;
    }

    /// Zero every adjoint on the tape.
    pub fn reset_adjoints(&mut self) {
        if self.multi {
            self.adjoints.fill(0.0);
        } else {
            for i in 0..self.nodes.len() {
                self.nodes.get_mut(i).adjoint = 0.0;
            }
        }
    }

    /* ── reverse sweep ──────────────────────────────────────────────── */

    /// Back-propagate from `from` down to `to`, both inclusive. Requires the
    /// starting adjoint(s) to have been seeded.
    pub fn propagate(&mut self, from: usize, to: usize) {
        debug_assert!(from < self.nodes.len());
        for i in (to..=from).rev() {
            let node = *self.nodes.get(i);
            if node.n_args == 0 {
                continue;
            }
            if !self.multi {
                let adjoint = node.adjoint;
                for j in 0..node.n_args {
                    let der = *self.derivs.get(node.derivs_at + j);
                    let target = *self.args.get(node.args_at + j);
                    self.nodes.get_mut(target).adjoint += adjoint * der;
                }
            } else {
                for j in 0..node.n_args {
                    let der = *self.derivs.get(node.derivs_at + j);
                    let target = *self.args.get(node.args_at + j);
                    for k in 0..self.num_adjoints {
                        let adjoint = *self.adjoints.get(node.adjoints_at + k);
                        *self.adjoints.get_mut(target + k) += adjoint * der;
                    }
                }
            }
        }
    }

    /// Back-propagate from `root` all the way to the first node.
    pub fn propagate_from(&mut self, root: usize) -> Result<()> {
        if !self.nodes.contains(root) {
            return Err(AadError::NodeNotOnTape(root));
        }
        self.propagate(root, 0);
        Ok(())
    }

    /// Sweep from the node just below the mark back to the start. Used when
    /// the sub-graph up to the mark is shared by many backward passes.
    pub fn propagate_mark_to_start(&mut self) {
        let mark = self.nodes.mark_position();
        if mark == 0 || self.nodes.is_empty() {
            return;
        }
        self.propagate(mark - 1, 0);
    }

    /* ── lifecycle ──────────────────────────────────────────────────── */

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.derivs.clear();
        self.args.clear();
        self.adjoints.clear();
    }

    pub fn rewind(&mut self) {
        self.nodes.rewind();
        self.derivs.rewind();
        self.args.rewind();
        self.adjoints.rewind();
    }

    pub fn set_mark(&mut self) {
        self.nodes.set_mark();
        self.derivs.set_mark();
        self.args.set_mark();
        self.adjoints.set_mark();
    }

    /// Index of the first node recorded after the last mark.
    pub fn mark_position(&self) -> usize {
        self.nodes.mark_position()
    }

    pub fn rewind_to_mark(&mut self) {
        self.nodes.rewind_to_mark();
        self.derivs.rewind_to_mark();
        self.args.rewind_to_mark();
        self.adjoints.rewind_to_mark();
    }

    /* ── thread-local access ────────────────────────────────────────── */

    /// Run `f` against this thread's tape.
    pub fn with<R>(f: impl FnOnce(&mut Tape) -> R) -> R {
        TAPE.with(|t| f(&mut t.borrow_mut()))
    }

    /// Wipe this thread's tape back to an empty, single-output state.
    pub fn reset() {
        TAPE.with(|t| t.borrow_mut().clear());
    }
}

thread_local! {
    /// Each thread owns its own tape; recording and propagation never cross
    /// threads.
    pub static TAPE: RefCell<Tape> = RefCell::new(Tape::new());
}
