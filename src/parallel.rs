//! Collective reduce and broadcast between cooperating workers.
//!
//! Every worker holds a [`Collective`] handle carrying its rank and the size of
//! the worker set. Both primitives are blocking: a call returns only once every
//! rank has entered the same call, so all ranks must issue the same sequence of
//! collectives even when their local data is empty.
//!
//! Backends: [`SerialComm`] for a single worker, [`LocalComm`] for worker threads
//! inside one process and `MpiComm` (feature `mpi-support`) across processes.

use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

use crate::error::{BcdError, Result};

/// Rank that receives reductions and sources broadcasts.
pub const ROOT: usize = 0;

pub trait Collective {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    #[inline(always)]
    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Element-wise sum of `buf` over all ranks, stored in `buf` on [`ROOT`].
    /// The content of `buf` on the other ranks is unspecified afterwards.
    fn reduce_sum(&self, buf: &mut [f64]) -> Result<()>;

    /// Copies `buf` of [`ROOT`] into `buf` of every rank. Lengths must agree.
    fn broadcast(&self, buf: &mut [f64]) -> Result<()>;

    /// [`Collective::reduce_sum`] followed by [`Collective::broadcast`], so every
    /// rank leaves with the complete sum.
    fn all_reduce_sum(&self, buf: &mut [f64]) -> Result<()> {
        self.reduce_sum(buf)?;
        self.broadcast(buf)
    }

    /// Concatenates the rows held by each rank, in rank order, on every rank.
    ///
    /// `local` is a row-major block of `width` columns. The row counts are
    /// exchanged first, then every rank places its rows at its offset in a
    /// zero buffer and the buffers are summed.
    fn gather_rows(&self, local: &[f64], width: usize) -> Result<Vec<f64>> {
        debug_assert!(width > 0 && local.len() % width == 0);
        let mut counts = vec![0.0; self.size()];
        counts[self.rank()] = (local.len() / width) as f64;
        self.all_reduce_sum(&mut counts)?;
        let counts: Vec<usize> = counts.iter().map(|c| c.round() as usize).collect();
        let total: usize = counts.iter().sum();
        let start = counts[..self.rank()].iter().sum::<usize>() * width;
        let mut payload = vec![0.0; total * width];
        payload[start..start + local.len()].copy_from_slice(local);
        self.all_reduce_sum(&mut payload)?;
        Ok(payload)
    }
}

/// A worker set of one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Collective for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn reduce_sum(&self, _buf: &mut [f64]) -> Result<()> {
        Ok(())
    }
    fn broadcast(&self, _buf: &mut [f64]) -> Result<()> {
        Ok(())
    }
}

// --- LocalComm: worker threads in one process ---

struct Slots {
    data: Vec<Vec<f64>>,
    lens: Vec<usize>,
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Slots>,
}

impl Shared {
    /// Every rank sees the same lengths after the first barrier, so every rank
    /// reaches the same verdict and none of them leaves the collective early.
    fn check_lengths(&self, op: &str) -> Result<()> {
        let slots = self.slots.lock();
        let first = slots.lens[0];
        match slots.lens.iter().position(|&l| l != first) {
            None => Ok(()),
            Some(r) => Err(BcdError::Collective(format!(
                "{}: rank 0 passed {} values but rank {} passed {}",
                op, first, r, slots.lens[r]
            ))),
        }
    }
}

/// One rank of a group of threads that exchange data through shared memory.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalComm {
    /// Handles for ranks `0..size`. Each handle must be driven by its own thread.
    pub fn group(size: usize) -> Vec<LocalComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(Slots {
                data: vec![Vec::new(); size],
                lens: vec![0; size],
            }),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }

    /// Runs `f` on `size` scoped threads, one per rank, and returns the results
    /// ordered by rank.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        let group = LocalComm::group(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

impl Collective for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn reduce_sum(&self, buf: &mut [f64]) -> Result<()> {
        {
            let mut slots = self.shared.slots.lock();
            slots.lens[self.rank] = buf.len();
            slots.data[self.rank] = buf.to_vec();
        }
        self.shared.barrier.wait();
        let checked = self.shared.check_lengths("reduce_sum");
        if checked.is_ok() && self.is_root() {
            let slots = self.shared.slots.lock();
            buf.iter_mut().for_each(|x| *x = 0.0);
            for part in slots.data.iter() {
                for (x, y) in buf.iter_mut().zip(part.iter()) {
                    *x += *y;
                }
            }
        }
        // slots stay untouched until root has read them
        self.shared.barrier.wait();
        checked
    }

    fn broadcast(&self, buf: &mut [f64]) -> Result<()> {
        {
            let mut slots = self.shared.slots.lock();
            slots.lens[self.rank] = buf.len();
            if self.is_root() {
                slots.data[ROOT] = buf.to_vec();
            }
        }
        self.shared.barrier.wait();
        let checked = self.shared.check_lengths("broadcast");
        if checked.is_ok() && !self.is_root() {
            let slots = self.shared.slots.lock();
            buf.copy_from_slice(&slots.data[ROOT]);
        }
        self.shared.barrier.wait();
        checked
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// `MPI_COMM_WORLD` as a worker set. Dropping it finalizes MPI.
    pub struct MpiComm {
        world: SimpleCommunicator,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self> {
            let universe = mpi::initialize()
                .ok_or_else(|| BcdError::Collective("MPI has already been initialized".into()))?;
            let world = universe.world();
            Ok(MpiComm {
                world,
                _universe: universe,
            })
        }
    }

    impl Collective for MpiComm {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn reduce_sum(&self, buf: &mut [f64]) -> Result<()> {
            let root = self.world.process_at_rank(ROOT as i32);
            if self.is_root() {
                let send = buf.to_vec();
                root.reduce_into_root(&send[..], buf, SystemOperation::sum());
            } else {
                root.reduce_into(&buf[..], SystemOperation::sum());
            }
            Ok(())
        }

        fn broadcast(&self, buf: &mut [f64]) -> Result<()> {
            let root = self.world.process_at_rank(ROOT as i32);
            root.broadcast_into(buf);
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
