use crate::core::models::outcome::Basin;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcceptorError {
    #[error("Reactants must have at least one basin")]
    EmptyReactants,
    #[error("Products must have at least one basin")]
    EmptyProducts,
    #[error("Reactants and products cannot share basin(s): {0:?}")]
    Overlap(Vec<Basin>),
}

/// Decides whether the forward/reverse basin pair of a shooting attempt is accepted.
///
/// A branch that did not commit (`None`) must never be accepted.
pub trait Acceptor: Send + Sync + fmt::Debug {
    fn is_accepted(&self, basin_fwd: Option<Basin>, basin_rev: Option<Basin>) -> bool;
}

/// Accepts when both trajectories committed, to different basins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultAcceptor;

impl Acceptor for DefaultAcceptor {
    fn is_accepted(&self, basin_fwd: Option<Basin>, basin_rev: Option<Basin>) -> bool {
        matches!((basin_fwd, basin_rev), (Some(f), Some(r)) if f != r)
    }
}

/// Accepts when one trajectory ends in a reactant basin and the other in a product basin.
///
/// Two trajectories committing to different reactant basins (or different product
/// basins) are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiBasinAcceptor {
    reactants: BTreeSet<Basin>,
    products: BTreeSet<Basin>,
}

impl MultiBasinAcceptor {
    /// # Errors
    ///
    /// Returns [`AcceptorError`] if either set is empty or if the sets overlap.
    pub fn new(
        reactants: impl IntoIterator<Item = Basin>,
        products: impl IntoIterator<Item = Basin>,
    ) -> Result<Self, AcceptorError> {
        let reactants: BTreeSet<Basin> = reactants.into_iter().collect();
        let products: BTreeSet<Basin> = products.into_iter().collect();
        if reactants.is_empty() {
            return Err(AcceptorError::EmptyReactants);
        }
        if products.is_empty() {
            return Err(AcceptorError::EmptyProducts);
        }
        let shared: Vec<Basin> = reactants.intersection(&products).copied().collect();
        if !shared.is_empty() {
            return Err(AcceptorError::Overlap(shared));
        }
        Ok(Self {
            reactants,
            products,
        })
    }

    pub fn reactants(&self) -> &BTreeSet<Basin> {
        &self.reactants
    }

    pub fn products(&self) -> &BTreeSet<Basin> {
        &self.products
    }
}

impl Acceptor for MultiBasinAcceptor {
    fn is_accepted(&self, basin_fwd: Option<Basin>, basin_rev: Option<Basin>) -> bool {
        let (Some(fwd), Some(rev)) = (basin_fwd, basin_rev) else {
            return false;
        };
        (self.reactants.contains(&fwd) && self.products.contains(&rev))
            || (self.products.contains(&fwd) && self.reactants.contains(&rev))
    }
}

/// Declarative acceptor choice, validated by [`AcceptorSpec::build`] before any
/// simulation is launched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AcceptorSpec {
    #[default]
    Default,
    MultiBasin {
        reactants: Vec<Basin>,
        products: Vec<Basin>,
    },
}

impl AcceptorSpec {
    pub fn build(&self) -> Result<Arc<dyn Acceptor>, AcceptorError> {
        match self {
            AcceptorSpec::Default => Ok(Arc::new(DefaultAcceptor)),
            AcceptorSpec::MultiBasin {
                reactants,
                products,
            } => Ok(Arc::new(MultiBasinAcceptor::new(
                reactants.iter().copied(),
                products.iter().copied(),
            )?)),
        }
    }
}
