//! Multi-pass max prefix sum reduction.
//!
//! The reduction is expressed over (sum, max, argmax) triples. A leaf triple describes a single
//! input element; combining two adjacent triples yields the triple of their concatenation. Every
//! pass folds groups of up to `group_size` consecutive triples into one, so that after
//! `ceil(log_g(n))` passes a single triple describes the whole input: its `max` is the maximum
//! prefix sum and its `argmax` the (1-based) length of the first prefix reaching it.
//!
//! # Buffer discipline
//! The engine owns exactly three buffer sets, all allocated once with a capacity of
//! `round_up(n, group_size)` triples:
//! - the *seed* set, uploaded once and never written by a pass;
//! - the *front* and *back* sets, alternating as input and output of the passes.
//!
//! Running the reduction again only copies the seed set into the front set (a device-to-device
//! copy); nothing is reallocated or uploaded from the host.
//!
//! The engine is agnostic to where the passes run: a [`PassBackend`] provides buffer allocation,
//! transfers and the pass itself. See [`device::ClPassBackend`] for OpenCL and
//! [`host::HostPassBackend`] for a host emulation of the same kernel contract.

pub mod device;
pub mod host;

use crate::{
    error::{HarpError, Result},
    utils::round_up,
};

use tracing::debug;

/// Value of one (sum, max, argmax) triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefixSummary {
    /// Total of the summarized range.
    pub sum: i32,
    /// Maximum prefix sum reached inside the range (prefixes start at the beginning of the input).
    pub max: i32,
    /// 1-based index of the first element at which `max` is reached.
    pub argmax: u32,
}

impl PrefixSummary {
    /// Summary of an empty input.
    pub const EMPTY: Self = Self {
        sum: 0,
        max: i32::MIN,
        argmax: 0,
    };

    /// Summary of the single element `value` found at the 0-based position `index`.
    pub fn leaf(value: i32, index: usize) -> Self {
        Self {
            sum: value,
            max: value,
            argmax: index as u32 + 1,
        }
    }

    /// Summary of the range `self` immediately followed by the range `right`.
    ///
    /// The prefix maxima of `right` are shifted by the total of `self`. Only a strict improvement
    /// moves the argmax to the right, so the earliest index wins ties.
    pub fn combine(self, right: Self) -> Self {
        let candidate = self.sum + right.max;
        let (max, argmax) = if candidate > self.max {
            (candidate, right.argmax)
        } else {
            (self.max, self.argmax)
        };
        Self {
            sum: self.sum + right.sum,
            max,
            argmax,
        }
    }
}

/// Host-side content of the seed buffer set, padded to the global work size.
#[derive(Clone, Debug, PartialEq)]
pub struct PassSeed {
    pub sum: Vec<i32>,
    pub max: Vec<i32>,
    pub argmax: Vec<u32>,
}

impl PassSeed {
    /// Builds the seed of `input`, zero-padded up to `capacity` triples.
    pub fn new(input: &[i32], capacity: usize) -> Self {
        debug_assert!(capacity >= input.len());
        let mut sum = vec![0; capacity];
        sum[..input.len()].copy_from_slice(input);
        let mut argmax = vec![0; capacity];
        argmax
            .iter_mut()
            .take(input.len())
            .zip(1..)
            .for_each(|(a, i)| *a = i);
        Self {
            max: sum.clone(),
            sum,
            argmax,
        }
    }

    pub fn len(&self) -> usize {
        self.sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }
}

/// Where and how the reduction passes are executed.
///
/// A `Triple` is one buffer set: three parallel arrays (sum, max, argmax) of a fixed capacity.
pub trait PassBackend {
    type Triple;

    /// Number of triples folded by each work-group in a pass.
    fn group_size(&self) -> usize;

    /// Allocates a buffer set able to hold `capacity` triples.
    fn allocate(&mut self, capacity: usize) -> Result<Self::Triple>;

    /// Writes the whole seed into `triple`.
    fn upload(&mut self, triple: &mut Self::Triple, seed: &PassSeed) -> Result<()>;

    /// Copies the first `len` triples of `src` into `dst`.
    fn copy(&mut self, src: &Self::Triple, dst: &mut Self::Triple, len: usize) -> Result<()>;

    /// Runs one pass over the first `active` triples of `input`, writing
    /// `ceil(active / group_size)` triples to `output`. Returns once the pass has completed.
    fn pass(&mut self, input: &Self::Triple, output: &mut Self::Triple, active: usize)
        -> Result<()>;

    /// Reads the first triple of `triple`.
    fn read_head(&mut self, triple: &Self::Triple) -> Result<PrefixSummary>;
}

/// Which working set currently holds the live triples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Front,
    Back,
}

/// The three buffer sets of the engine.
struct Slots<T> {
    seed: T,
    front: T,
    back: T,
    current: Role,
}

impl<T> Slots<T> {
    fn current(&self) -> &T {
        match self.current {
            Role::Front => &self.front,
            Role::Back => &self.back,
        }
    }

    /// Borrows the current set (pass input) and the other working set (pass output).
    fn split(&mut self) -> (&T, &mut T) {
        match self.current {
            Role::Front => (&self.front, &mut self.back),
            Role::Back => (&self.back, &mut self.front),
        }
    }

    fn rotate(&mut self) {
        self.current = match self.current {
            Role::Front => Role::Back,
            Role::Back => Role::Front,
        };
    }
}

/// Number of passes needed to reduce `n` triples to one with groups of `group_size`.
///
/// # Panics
/// Panics if `group_size` is below 2, as such passes never shrink the input.
/// [`MaxPrefixSumEngine::new`] rejects these group sizes with [`HarpError::InvalidConfig`].
pub fn pass_count(n: usize, group_size: usize) -> usize {
    assert!(group_size >= 2, "a group size below 2 never shrinks the input");
    let mut passes = 0;
    let mut work_size = n;
    while work_size > 1 {
        work_size = work_size.div_ceil(group_size);
        passes += 1;
    }
    passes
}

/// Max prefix sum reduction engine.
pub struct MaxPrefixSumEngine<B: PassBackend> {
    backend: B,
    slots: Slots<B::Triple>,
    len: usize,
    global_work_size: usize,
    /// Whether the working sets hold the output of previous passes instead of the seed.
    dirty: bool,
}

impl<B: PassBackend> MaxPrefixSumEngine<B> {
    /// Allocates the buffer sets for `input` and uploads its seed.
    pub fn new(mut backend: B, input: &[i32]) -> Result<Self> {
        let group_size = backend.group_size();
        if input.is_empty() {
            return Err(HarpError::InvalidConfig(
                "max prefix sum input must not be empty".into(),
            ));
        }
        if group_size < 2 {
            return Err(HarpError::InvalidConfig(format!(
                "work-group size must be at least 2 to shrink the input, got {group_size}"
            )));
        }
        let global_work_size = round_up(input.len(), group_size);
        if u32::try_from(global_work_size).is_err() {
            return Err(HarpError::InvalidConfig(format!(
                "{} elements exceed the 32-bit index range of the kernel",
                input.len()
            )));
        }

        let seed_data = PassSeed::new(input, global_work_size);
        let mut seed = backend.allocate(global_work_size)?;
        let front = backend.allocate(global_work_size)?;
        let back = backend.allocate(global_work_size)?;
        backend.upload(&mut seed, &seed_data)?;
        debug!(
            len = input.len(),
            global_work_size, group_size, "allocated max prefix sum buffer sets"
        );

        let mut engine = Self {
            backend,
            slots: Slots {
                seed,
                front,
                back,
                current: Role::Front,
            },
            len: input.len(),
            global_work_size,
            dirty: true,
        };
        engine.reseed()?;
        Ok(engine)
    }

    /// Number of input elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Capacity of each buffer set (input length rounded up to the group size).
    pub fn global_work_size(&self) -> usize {
        self.global_work_size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Restores the seed into the front set and makes it current.
    pub fn reseed(&mut self) -> Result<()> {
        let Slots { seed, front, .. } = &mut self.slots;
        self.backend.copy(seed, front, self.global_work_size)?;
        self.slots.current = Role::Front;
        self.dirty = false;
        Ok(())
    }

    /// Runs every pass until a single triple remains and returns the number of passes.
    ///
    /// The working sets are reseeded first if a previous run consumed them.
    pub fn run_passes(&mut self) -> Result<usize> {
        if self.dirty {
            self.reseed()?;
        }

        let group_size = self.backend.group_size();
        let mut work_size = self.len;
        let mut passes = 0;
        while work_size > 1 {
            let (input, output) = self.slots.split();
            self.backend.pass(input, output, work_size)?;
            debug!(pass = passes, work_size, "max prefix sum pass done");
            work_size = work_size.div_ceil(group_size);
            self.slots.rotate();
            passes += 1;
        }

        self.dirty = passes > 0;
        Ok(passes)
    }

    /// Reads the aggregate left in the current set by [`Self::run_passes`].
    pub fn read_result(&mut self) -> Result<PrefixSummary> {
        self.backend.read_head(self.slots.current())
    }

    /// Runs the full reduction and returns the summary of the whole input.
    pub fn reduce(&mut self) -> Result<PrefixSummary> {
        self.run_passes()?;
        self.read_result()
    }
}
