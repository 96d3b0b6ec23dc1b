//! # Chain Structuring
//!
//! Authored blocks arrive as a flat ordered sequence of `if` / `else_if` /
//! `else` branches. This module groups them into chains, where a chain is
//! one `if`, any number of `else_if` arms, and at most one closing `else`.
//! Within a chain at most one arm fires per run.
//!
//! Both the interpreter and the script generator structure blocks through
//! this one routine, so the two backends cannot disagree about chain shape.
//!
//! ## Recovery
//!
//! Authored sequences are not always well formed. An `else_if` with no
//! chain to extend opens a new chain and behaves like a fresh `if`. An
//! `else` with no chain to close becomes a chain of its own and fires
//! unconditionally. The lint pass reports both shapes; execution accepts
//! them.

use crate::ast::{Block, BlockKind};

/// Role of a block inside its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmRole {
    /// Fires when its conditions hold and no earlier arm of the chain has
    /// fired.
    Branch,
    /// Fires when no earlier arm of the chain has fired.
    Fallback,
}

/// One block together with its position and chain role.
#[derive(Debug, Clone, Copy)]
pub struct ChainArm<'a> {
    /// Position in the original block sequence.
    pub index: usize,
    pub block: &'a Block,
    pub role: ArmRole,
}

/// An `if` chain: conditional arms in order, optionally ending in a
/// fallback.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    pub arms: Vec<ChainArm<'a>>,
}

/// Groups the block sequence into chains, preserving block order.
pub fn structure(blocks: &[Block]) -> Vec<Chain<'_>> {
    let mut chains = Vec::new();
    let mut open: Option<Chain> = None;

    for (index, block) in blocks.iter().enumerate() {
        match block.kind {
            BlockKind::If => {
                if let Some(chain) = open.take() {
                    chains.push(chain);
                }
                open = Some(Chain {
                    arms: vec![ChainArm {
                        index,
                        block,
                        role: ArmRole::Branch,
                    }],
                });
            }
            BlockKind::ElseIf => match open.as_mut() {
                Some(chain) => chain.arms.push(ChainArm {
                    index,
                    block,
                    role: ArmRole::Branch,
                }),
                // Orphan: recovered as the start of a new chain.
                None => {
                    open = Some(Chain {
                        arms: vec![ChainArm {
                            index,
                            block,
                            role: ArmRole::Branch,
                        }],
                    });
                }
            },
            BlockKind::Else => {
                // Closes the open chain; an orphan becomes its own
                // unconditional chain.
                let mut chain = open.take().unwrap_or(Chain { arms: Vec::new() });
                chain.arms.push(ChainArm {
                    index,
                    block,
                    role: ArmRole::Fallback,
                });
                chains.push(chain);
            }
        }
    }

    if let Some(chain) = open.take() {
        chains.push(chain);
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, BlockKind, Join};

    fn block(kind: BlockKind) -> Block {
        Block::new(kind, Join::All, vec![], vec![])
    }

    fn shape(chains: &[Chain]) -> Vec<Vec<(usize, ArmRole)>> {
        chains
            .iter()
            .map(|c| c.arms.iter().map(|a| (a.index, a.role)).collect())
            .collect()
    }

    #[test]
    fn test_full_chain() {
        let blocks = vec![
            block(BlockKind::If),
            block(BlockKind::ElseIf),
            block(BlockKind::Else),
        ];
        assert_eq!(
            shape(&structure(&blocks)),
            vec![vec![
                (0, ArmRole::Branch),
                (1, ArmRole::Branch),
                (2, ArmRole::Fallback),
            ]]
        );
    }

    #[test]
    fn test_else_closes_chain() {
        let blocks = vec![
            block(BlockKind::If),
            block(BlockKind::Else),
            block(BlockKind::If),
        ];
        assert_eq!(
            shape(&structure(&blocks)),
            vec![
                vec![(0, ArmRole::Branch), (1, ArmRole::Fallback)],
                vec![(2, ArmRole::Branch)],
            ]
        );
    }

    #[test]
    fn test_orphan_else_if_opens_new_chain() {
        let blocks = vec![block(BlockKind::ElseIf), block(BlockKind::Else)];
        assert_eq!(
            shape(&structure(&blocks)),
            vec![vec![(0, ArmRole::Branch), (1, ArmRole::Fallback)]]
        );
    }

    #[test]
    fn test_orphan_else_is_unconditional_chain() {
        let blocks = vec![
            block(BlockKind::If),
            block(BlockKind::Else),
            block(BlockKind::Else),
        ];
        assert_eq!(
            shape(&structure(&blocks)),
            vec![
                vec![(0, ArmRole::Branch), (1, ArmRole::Fallback)],
                vec![(2, ArmRole::Fallback)],
            ]
        );
    }

    #[test]
    fn test_if_after_else_if_starts_fresh() {
        let blocks = vec![
            block(BlockKind::If),
            block(BlockKind::ElseIf),
            block(BlockKind::If),
            block(BlockKind::ElseIf),
        ];
        assert_eq!(
            shape(&structure(&blocks)),
            vec![
                vec![(0, ArmRole::Branch), (1, ArmRole::Branch)],
                vec![(2, ArmRole::Branch), (3, ArmRole::Branch)],
            ]
        );
    }
}
