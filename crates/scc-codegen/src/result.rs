//! Code generation results.
//!
//! A result tracks the first instruction of the sequence just emitted,
//! the symbol holding the value (for expressions), and lists of emitted
//! jumps whose targets are still unknown. Statement results additionally
//! carry break/continue lists and control-flow flags used for static
//! reachability checks.

use bitflags::bitflags;
use scc_core::{ImopId, SymbolId};

#[derive(Clone, Debug, Default)]
pub struct CGResult {
    first: Option<ImopId>,
    symbol: Option<SymbolId>,
    next_list: Vec<ImopId>,
}

impl CGResult {
    pub fn new() -> Self {
        CGResult::default()
    }

    pub fn with_symbol(symbol: SymbolId) -> Self {
        CGResult {
            symbol: Some(symbol),
            ..CGResult::default()
        }
    }

    pub fn first_imop(&self) -> Option<ImopId> {
        self.first
    }

    /// Record the first instruction if none is known yet.
    pub fn patch_first_imop(&mut self, imop: Option<ImopId>) {
        if self.first.is_none() {
            self.first = imop;
        }
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        self.symbol
    }

    pub fn set_symbol(&mut self, symbol: SymbolId) {
        self.symbol = Some(symbol);
    }

    pub fn next_list(&self) -> &[ImopId] {
        &self.next_list
    }

    pub fn add_to_next_list(&mut self, imop: ImopId) {
        self.next_list.push(imop);
    }

    pub fn extend_next_list(&mut self, imops: impl IntoIterator<Item = ImopId>) {
        self.next_list.extend(imops);
    }

    pub fn take_next_list(&mut self) -> Vec<ImopId> {
        std::mem::take(&mut self.next_list)
    }

    pub fn set_next_list(&mut self, list: Vec<ImopId>) {
        self.next_list = list;
    }
}

/// Result of lowering a boolean expression for control flow: lists of
/// jumps taken when the condition is true / false.
#[derive(Clone, Debug, Default)]
pub struct CGBranchResult {
    pub result: CGResult,
    pub true_list: Vec<ImopId>,
    pub false_list: Vec<ImopId>,
}

impl CGBranchResult {
    pub fn new() -> Self {
        CGBranchResult::default()
    }

    pub fn first_imop(&self) -> Option<ImopId> {
        self.result.first_imop()
    }

    pub fn patch_first_imop(&mut self, imop: Option<ImopId>) {
        self.result.patch_first_imop(imop);
    }
}

bitflags! {
    /// How control may leave a statement.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StmtFlags: u8 {
        const FALLTHRU = 0x1;
        const BREAK    = 0x2;
        const CONTINUE = 0x4;
        const RETURN   = 0x8;
    }
}

#[derive(Clone, Debug)]
pub struct CGStmtResult {
    pub result: CGResult,
    pub break_list: Vec<ImopId>,
    pub continue_list: Vec<ImopId>,
    pub flags: StmtFlags,
}

impl Default for CGStmtResult {
    fn default() -> Self {
        CGStmtResult {
            result: CGResult::new(),
            break_list: Vec::new(),
            continue_list: Vec::new(),
            flags: StmtFlags::FALLTHRU,
        }
    }
}

impl CGStmtResult {
    pub fn new() -> Self {
        CGStmtResult::default()
    }

    pub fn first_imop(&self) -> Option<ImopId> {
        self.result.first_imop()
    }

    pub fn may_fall_through(&self) -> bool {
        self.flags.contains(StmtFlags::FALLTHRU)
    }
}
