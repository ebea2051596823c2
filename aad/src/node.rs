/// Node stored on the tape: one recorded arithmetic operation.
///
/// `n_args` is 0 for an input leaf, 1 for mixed `Number`/`f64` operations and
/// 2 for operations on two `Number`s. `derivs_at` and `args_at` locate the
/// node's local derivatives and its child-adjoint slots in the tape's arenas;
/// `adjoints_at` is only meaningful when the tape runs in multi-output mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct TapeNode {
    pub(crate) n_args: usize,
    pub(crate) derivs_at: usize,
    pub(crate) args_at: usize,
    pub(crate) adjoint: f64,
    pub(crate) adjoints_at: usize,
}

impl TapeNode {
    #[inline]
    pub fn n_args(&self) -> usize {
        self.n_args
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.n_args == 0
    }

    /// Single-output adjoint.
    #[inline]
    pub fn adjoint(&self) -> f64 {
        self.adjoint
    }
}
