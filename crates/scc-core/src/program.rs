//! Basic blocks, procedures and the program graph.
//!
//! The code generator emits one flat instruction list; `Program::build`
//! splits it at leaders into basic blocks, resolves label symbols to
//! their blocks, and constructs the labelled control-flow edges:
//!
//! * `Jump`/`True`/`False`: intra-procedural control flow,
//! * `Call`: from a calling block to the callee entry,
//! * `Ret`: from a returning block back to the continuation of every
//!   call site,
//! * `CallPass`: from the calling block straight to its continuation;
//!   facts about caller locals flow along this edge, while `Call`/`Ret`
//!   edges carry only facts that escape procedure boundaries.

use crate::imop::{ICode, Imop, ImopId, Opcode};
use crate::symbol::{SymbolArena, SymbolId, SymbolKind};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// A block address within the whole program.
pub type BlockRef = (ProcId, BlockId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    Jump,
    True,
    False,
    Call,
    Ret,
    CallPass,
}

impl Edge {
    /// Edges that cross procedure boundaries carry only globally visible
    /// facts.
    pub fn is_global(self) -> bool {
        matches!(self, Edge::Call | Edge::Ret)
    }

    pub fn label(self) -> &'static str {
        match self {
            Edge::Jump => "",
            Edge::True => "+",
            Edge::False => "-",
            Edge::Call => "call",
            Edge::Ret => "ret",
            Edge::CallPass => "pass",
        }
    }
}

#[derive(Debug)]
pub struct Block {
    /// Program-wide block number, used by printers and DOT output.
    pub index: u32,
    pub imops: Vec<Imop>,
    pub succ: Vec<(BlockRef, Edge)>,
    pub pred: Vec<(BlockRef, Edge)>,
    pub reachable: bool,
    /// Depth-first number within the owning procedure.
    pub dfn: u32,
}

impl Block {
    pub fn last(&self) -> Option<&Imop> {
        self.imops.last()
    }
}

#[derive(Debug)]
pub struct Procedure {
    /// The procedure symbol; `None` for the program start code.
    pub name: Option<SymbolId>,
    pub blocks: Vec<Block>,
}

impl Procedure {
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }
}

#[derive(Debug)]
pub struct Program {
    pub procedures: Vec<Procedure>,
}

impl Program {
    pub fn proc(&self, id: ProcId) -> &Procedure {
        &self.procedures[id.0 as usize]
    }

    pub fn proc_mut(&mut self, id: ProcId) -> &mut Procedure {
        &mut self.procedures[id.0 as usize]
    }

    pub fn block(&self, at: BlockRef) -> &Block {
        self.proc(at.0).block(at.1)
    }

    pub fn block_mut(&mut self, at: BlockRef) -> &mut Block {
        self.proc_mut(at.0).block_mut(at.1)
    }

    pub fn proc_ids(&self) -> impl Iterator<Item = ProcId> {
        (0..self.procedures.len() as u32).map(ProcId)
    }

    pub fn all_blocks(&self) -> impl Iterator<Item = (BlockRef, &Block)> {
        self.proc_ids().flat_map(move |p| {
            self.proc(p)
                .block_ids()
                .map(move |b| ((p, b), self.proc(p).block(b)))
        })
    }

    /// Quasi-reverse-postorder over the whole program: procedures in
    /// order, blocks of each procedure in reverse postorder of its
    /// intra-procedural edges.
    pub fn rpo(&self) -> Vec<BlockRef> {
        let mut order = Vec::new();
        for p in self.proc_ids() {
            let proc = self.proc(p);
            let n = proc.blocks.len();
            let mut visited = vec![false; n];
            let mut post = Vec::with_capacity(n);
            // Iterative DFS from the entry.
            let mut stack: Vec<(BlockId, usize)> = vec![(proc.entry(), 0)];
            visited[0] = true;
            while let Some((b, i)) = stack.pop() {
                let succs: Vec<BlockId> = proc
                    .block(b)
                    .succ
                    .iter()
                    .filter(|((sp, _), e)| *sp == p && !e.is_global())
                    .map(|((_, sb), _)| *sb)
                    .collect();
                if i < succs.len() {
                    stack.push((b, i + 1));
                    let next = succs[i];
                    if !visited[next.0 as usize] {
                        visited[next.0 as usize] = true;
                        stack.push((next, 0));
                    }
                } else {
                    post.push(b);
                }
            }

            for &b in post.iter().rev() {
                order.push((p, b));
            }
            // Unreached blocks go last, in index order.
            for b in proc.block_ids() {
                if !visited[b.0 as usize] {
                    order.push((p, b));
                }
            }
        }

        order
    }

    /// Split a flat instruction list into blocks and build the edges.
    ///
    /// `proc_starts` gives, in emission order, each procedure's symbol
    /// (None for the start code) and the index of its first instruction.
    pub fn build(
        icode: ICode,
        proc_starts: &[(Option<SymbolId>, ImopId)],
        arena: &mut SymbolArena,
    ) -> Program {
        let imops = icode.into_imops();
        let total = imops.len() as u32;
        assert!(!proc_starts.is_empty(), "program without start code");

        // Procedure ranges.
        let mut ranges: Vec<(Option<SymbolId>, u32, u32)> = Vec::new();
        for (i, &(name, start)) in proc_starts.iter().enumerate() {
            let end = proc_starts
                .get(i + 1)
                .map(|&(_, s)| s.0)
                .unwrap_or(total);
            ranges.push((name, start.0, end));
        }

        // Label targets referenced by jump instructions.
        let mut label_targets: FxHashMap<SymbolId, u32> = FxHashMap::default();
        for imop in &imops {
            let mut note = |sym: Option<SymbolId>| {
                if let Some(sym) = sym {
                    if let SymbolKind::Label { imop: target, .. } = &arena.get(sym).kind {
                        label_targets.insert(sym, target.0);
                    }
                }
            };
            match imop.op {
                Opcode::Jump | Opcode::Jt | Opcode::Jf => note(imop.arg(0)),
                Opcode::RetClean => note(imop.arg(2)),
                Opcode::Return => note(imop.arg(0)),
                _ => {}
            }
        }

        // Leaders.
        let mut leaders: FxHashSet<u32> = FxHashSet::default();
        for &(_, start, _) in &ranges {
            leaders.insert(start);
        }
        for &target in label_targets.values() {
            leaders.insert(target);
        }
        for (i, imop) in imops.iter().enumerate() {
            if imop.op.is_terminator() || imop.op == Opcode::Call {
                leaders.insert(i as u32 + 1);
            }
        }
        leaders.remove(&total);

        // Carve out the blocks.
        let mut procedures: Vec<Procedure> = Vec::new();
        let mut place: FxHashMap<u32, BlockRef> = FxHashMap::default();
        let mut imop_iter = imops.into_iter().enumerate();
        let mut block_index = 0u32;
        for (pi, &(name, start, end)) in ranges.iter().enumerate() {
            let proc_id = ProcId(pi as u32);
            let mut blocks: Vec<Block> = Vec::new();
            let mut current: Vec<Imop> = Vec::new();
            let mut current_start = start;
            let mut flush =
                |blocks: &mut Vec<Block>, current: &mut Vec<Imop>, current_start: &mut u32, next: u32| {
                    if !current.is_empty() {
                        let bid = BlockId(blocks.len() as u32);
                        place.insert(*current_start, (proc_id, bid));
                        blocks.push(Block {
                            index: block_index,
                            imops: std::mem::take(current),
                            succ: Vec::new(),
                            pred: Vec::new(),
                            reachable: false,
                            dfn: 0,
                        });
                        block_index += 1;
                        *current_start = next;
                    }
                };

            for i in start..end {
                if leaders.contains(&i) && i != current_start {
                    flush(&mut blocks, &mut current, &mut current_start, i);
                }
                if current.is_empty() {
                    current_start = i;
                }
                let (_, imop) = imop_iter.next().expect("instruction list length");
                current.push(imop);
            }
            flush(&mut blocks, &mut current, &mut current_start, end);

            procedures.push(Procedure { name, blocks });
        }

        // Resolve label symbols to blocks.
        for (&sym, &target) in &label_targets {
            let at = place
                .get(&target)
                .copied()
                .expect("jump target is a block leader");
            if let SymbolKind::Label { block, .. } = &mut arena.get_mut(sym).kind {
                *block = Some(at);
            }
        }

        // Procedure symbol -> entry block, and call-site continuations.
        let mut proc_entry: FxHashMap<SymbolId, BlockRef> = FxHashMap::default();
        for (pi, &(name, start, _)) in ranges.iter().enumerate() {
            if let Some(name) = name {
                let entry = place[&start];
                proc_entry.insert(name, entry);
                if let SymbolKind::Procedure(info) = &mut arena.get_mut(name).kind {
                    info.block = Some((ProcId(pi as u32), entry.1));
                }
            }
        }

        let mut program = Program { procedures };

        // Edges.
        let mut edges: Vec<(BlockRef, BlockRef, Edge)> = Vec::new();
        // Continuations of every call site, per callee.
        let mut call_conts: FxHashMap<SymbolId, Vec<BlockRef>> = FxHashMap::default();

        for p in program.proc_ids() {
            let proc = program.proc(p);
            let range = ranges[p.0 as usize];
            let mut at = range.1;
            for b in proc.block_ids() {
                let block = proc.block(b);
                let next_start = at + block.imops.len() as u32;
                let this = (p, b);
                let fallthrough = place.get(&next_start).copied().filter(|_| next_start < range.2);

                match block.last().map(|imop| imop.op) {
                    Some(Opcode::Jump) => {
                        let target = jump_target(block.last().unwrap(), arena);
                        edges.push((this, target, Edge::Jump));
                    }
                    Some(Opcode::Jt) => {
                        let target = jump_target(block.last().unwrap(), arena);
                        edges.push((this, target, Edge::True));
                        if let Some(next) = fallthrough {
                            edges.push((this, next, Edge::False));
                        }
                    }
                    Some(Opcode::Jf) => {
                        let target = jump_target(block.last().unwrap(), arena);
                        edges.push((this, target, Edge::False));
                        if let Some(next) = fallthrough {
                            edges.push((this, next, Edge::True));
                        }
                    }
                    Some(Opcode::Call) => {
                        let callee = block.last().unwrap().arg(0).expect("CALL target");
                        if let Some(&entry) = proc_entry.get(&callee) {
                            edges.push((this, entry, Edge::Call));
                        }
                        if let Some(next) = fallthrough {
                            edges.push((this, next, Edge::CallPass));
                            call_conts.entry(callee).or_default().push(next);
                        }
                    }
                    Some(Opcode::Return) | Some(Opcode::Error) | Some(Opcode::End) => {}
                    _ => {
                        if let Some(next) = fallthrough {
                            edges.push((this, next, Edge::Jump));
                        }
                    }
                }

                at = next_start;
            }
        }

        // Ret edges from every returning block of a procedure to every
        // continuation of its call sites.
        for p in program.proc_ids() {
            let name = match program.proc(p).name {
                Some(name) => name,
                None => continue,
            };
            let conts = match call_conts.get(&name) {
                Some(conts) => conts.clone(),
                None => continue,
            };
            let ret_blocks: Vec<BlockId> = program
                .proc(p)
                .block_ids()
                .filter(|&b| {
                    matches!(
                        program.proc(p).block(b).last().map(|i| i.op),
                        Some(Opcode::Return)
                    )
                })
                .collect();
            for b in ret_blocks {
                for &cont in &conts {
                    edges.push(((p, b), cont, Edge::Ret));
                }
            }
        }

        for (from, to, edge) in edges {
            program.block_mut(from).succ.push((to, edge));
            program.block_mut(to).pred.push((from, edge));
        }

        program.compute_reachability();
        program.compute_dfn();
        program
    }

    fn compute_reachability(&mut self) {
        let start: BlockRef = (ProcId(0), BlockId(0));
        let mut stack = vec![start];
        let mut seen: FxHashSet<BlockRef> = FxHashSet::default();
        seen.insert(start);
        while let Some(at) = stack.pop() {
            let succs: Vec<BlockRef> = self.block(at).succ.iter().map(|(to, _)| *to).collect();
            for to in succs {
                if seen.insert(to) {
                    stack.push(to);
                }
            }
        }

        for p in 0..self.procedures.len() {
            for b in 0..self.procedures[p].blocks.len() {
                let at = (ProcId(p as u32), BlockId(b as u32));
                self.block_mut(at).reachable = seen.contains(&at);
            }
        }
    }

    fn compute_dfn(&mut self) {
        for p in 0..self.procedures.len() {
            let proc_id = ProcId(p as u32);
            let n = self.procedures[p].blocks.len();
            let mut visited = vec![false; n];
            let mut counter = 0u32;
            let mut stack = vec![BlockId(0)];
            visited[0] = true;
            while let Some(b) = stack.pop() {
                counter += 1;
                self.procedures[p].blocks[b.0 as usize].dfn = counter;
                let succs: Vec<BlockId> = self.procedures[p].blocks[b.0 as usize]
                    .succ
                    .iter()
                    .filter(|((sp, _), e)| *sp == proc_id && !e.is_global())
                    .map(|((_, sb), _)| *sb)
                    .collect();
                for s in succs {
                    if !visited[s.0 as usize] {
                        visited[s.0 as usize] = true;
                        stack.push(s);
                    }
                }
            }
        }
    }
}

fn jump_target(imop: &Imop, arena: &SymbolArena) -> BlockRef {
    let label = imop.arg(0).expect("jump with a patched target");
    match &arena.get(label).kind {
        SymbolKind::Label {
            block: Some(at), ..
        } => *at,
        _ => panic!("jump target is not a resolved label"),
    }
}
