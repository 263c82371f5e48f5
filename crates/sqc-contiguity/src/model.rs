use sqc_schemas::{Seq, NO_CURSOR};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContiguityError {
    /// A window of zero positions can never make progress.
    ZeroBatch,
    NegativeSequence(Seq),
}

impl fmt::Display for ContiguityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContiguityError::ZeroBatch => write!(f, "batch_size must be >= 1"),
            ContiguityError::NegativeSequence(s) => {
                write!(f, "sequence numbers must be >= 0, got {s}")
            }
        }
    }
}

impl std::error::Error for ContiguityError {}

// ---------------------------------------------------------------------------
// Incremental model
// ---------------------------------------------------------------------------

/// Incremental form of the contiguity algorithm: feed arrivals one at a time.
#[derive(Clone, Debug)]
pub struct ContiguityModel {
    batch: Seq,
    /// Arrivals above the pointer; confirmed ones are pruned.
    ahead: BTreeSet<Seq>,
    pointer: Seq,
}

impl ContiguityModel {
    pub fn new(batch_size: u32) -> Result<Self, ContiguityError> {
        if batch_size == 0 {
            return Err(ContiguityError::ZeroBatch);
        }
        Ok(Self {
            batch: Seq::from(batch_size),
            ahead: BTreeSet::new(),
            pointer: NO_CURSOR,
        })
    }

    /// Current confirmed position ([`NO_CURSOR`] before the first advance).
    pub fn cursor(&self) -> Seq {
        self.pointer
    }

    /// Record one arrival. Returns the positions reached because of it, in
    /// order; empty when the arrival is out of order or already confirmed.
    pub fn arrive(&mut self, seq: Seq) -> Result<Vec<Seq>, ContiguityError> {
        if seq < 0 {
            return Err(ContiguityError::NegativeSequence(seq));
        }

        let mut reached = Vec::new();
        if seq <= self.pointer {
            return Ok(reached);
        }
        if seq != self.pointer + 1 {
            self.ahead.insert(seq);
            return Ok(reached);
        }

        self.pointer = seq;
        reached.push(seq);

        // Scan-ahead: one window per round, continue only after a full window.
        loop {
            let from = self.pointer;
            while self.pointer - from < self.batch && self.take_successor() {
                self.pointer += 1;
            }
            if self.pointer > from {
                reached.push(self.pointer);
            }
            if self.pointer - from < self.batch {
                break;
            }
        }

        Ok(reached)
    }

    /// Remove and report the arrival right after the pointer, if any.
    fn take_successor(&mut self) -> bool {
        match self.pointer.checked_add(1) {
            Some(next) => self.ahead.remove(&next),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Whole-run helpers
// ---------------------------------------------------------------------------

/// Every distinct cursor position reached over `arrivals`, in order.
pub fn cursor_positions(arrivals: &[Seq], batch_size: u32) -> Result<Vec<Seq>, ContiguityError> {
    let mut model = ContiguityModel::new(batch_size)?;
    let mut out = Vec::new();
    for &seq in arrivals {
        out.extend(model.arrive(seq)?);
    }
    Ok(out)
}

/// Final cursor after all `arrivals`. Independent of batch size.
pub fn final_cursor(arrivals: &[Seq]) -> Result<Seq, ContiguityError> {
    let mut model = ContiguityModel::new(1)?;
    for &seq in arrivals {
        model.arrive(seq)?;
    }
    Ok(model.cursor())
}
