//! # Name allocation for unnamed resources.
//!
//! [`NameAllocator`] owns the candidate pool. Each [`allocate`](NameAllocator::allocate)
//! draws names at random without replacement and asks an existence probe about
//! them until one is free.
//!
//! ## Rules
//! - Every name the probe answered for leaves the pool, free or taken, so a
//!   name confirmed taken is never probed again in this process.
//! - A probe error puts the name back (nothing was confirmed) and is returned.
//! - The pool only shrinks, except through [`add`](NameAllocator::add).

use std::future::Future;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ControllerError, SupervisorError};

/// Owner of the candidate name pool.
#[derive(Debug)]
pub struct NameAllocator {
    pool: Vec<String>,
    rng: StdRng,
}

impl NameAllocator {
    /// Creates an allocator over `names` (duplicates dropped, order kept).
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rng(names, StdRng::from_rng(&mut rand::rng()))
    }

    /// Creates an allocator with a deterministic draw order.
    pub fn with_seed<I, S>(names: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rng(names, StdRng::seed_from_u64(seed))
    }

    fn with_rng<I, S>(names: I, rng: StdRng) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut me = Self {
            pool: Vec::new(),
            rng,
        };
        for name in names {
            me.add(name);
        }
        me
    }

    /// Adds a candidate (ignored if already pooled).
    pub fn add(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.pool.contains(&name) {
            self.pool.push(name);
        }
    }

    /// Names not yet probed.
    pub fn remaining(&self) -> &[String] {
        &self.pool
    }

    /// Returns `true` if no candidates are left.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Returns the first free name.
    ///
    /// `exists` is asked about each drawn candidate and answers `true` when
    /// the name already denotes a live resource.
    ///
    /// ### Errors
    /// - [`SupervisorError::EmptyPool`] when called on an empty pool
    /// - [`SupervisorError::ExhaustedPool`] when every candidate is taken
    /// - [`SupervisorError::Controller`] when the probe fails
    pub async fn allocate<F, Fut>(&mut self, mut exists: F) -> Result<String, SupervisorError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, ControllerError>>,
    {
        if self.pool.is_empty() {
            return Err(SupervisorError::EmptyPool);
        }

        let mut tried = Vec::new();
        while !self.pool.is_empty() {
            let idx = self.rng.random_range(0..self.pool.len());
            let name = self.pool.remove(idx);

            match exists(name.clone()).await {
                Ok(true) => tried.push(name),
                Ok(false) => return Ok(name),
                Err(e) => {
                    self.pool.insert(idx, name);
                    return Err(e.into());
                }
            }
        }
        Err(SupervisorError::ExhaustedPool { tried })
    }
}
