use std::cmp::Ordering;

use smallvec::SmallVec;
use thiserror::Error;

use crate::varnodedata::VarnodeData;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("cannot create a join without pieces")]
    NoPieces,
    #[error("cannot create a zero size join")]
    ZeroSize,
    #[error("single piece join of {size} bytes requires a larger logical size (got {logical})")]
    MissingExtension {
        size: usize,
        logical: usize,
    },
    #[error("join space not defined")]
    NoJoinSpace,
    #[error("pieces can only be joined from processor or spacebase spaces")]
    InvalidLocation,
}

pub type Pieces = SmallVec<[VarnodeData; 2]>;

/// A logical value stored across one or more physical locations, most
/// significant piece first, together with its location in the join space.
#[derive(Debug, Clone)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct JoinRecord {
    pub(crate) pieces: Pieces,
    pub(crate) unified: VarnodeData,
}

impl JoinRecord {
    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    /// A single piece viewed as a wider value (e.g., a float register).
    pub fn is_float_extension(&self) -> bool {
        self.pieces.len() == 1
    }

    pub fn piece(&self, i: usize) -> Option<&VarnodeData> {
        self.pieces.get(i)
    }

    pub fn pieces(&self) -> &[VarnodeData] {
        &self.pieces
    }

    pub fn unified(&self) -> &VarnodeData {
        &self.unified
    }
}

/// Orders piece sequences lexicographically; each piece is compared by
/// space index, offset and size.
pub(crate) fn compare_pieces(lpieces: &[VarnodeData], rpieces: &[VarnodeData]) -> Ordering {
    for (l, r) in lpieces.iter().zip(rpieces.iter()) {
        let ord = l
            .space()
            .index()
            .cmp(&r.space().index())
            .then_with(|| l.offset().cmp(&r.offset()))
            .then_with(|| l.size().cmp(&r.size()));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    lpieces.len().cmp(&rpieces.len())
}

impl PartialEq for JoinRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for JoinRecord {}

impl PartialOrd for JoinRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JoinRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_pieces(&self.pieces, &other.pieces)
    }
}

/// De-duplication key for join records: the piece sequence alone.
#[derive(Debug, Clone)]
pub(crate) struct JoinKey {
    pub(crate) pieces: Pieces,
}

impl PartialEq for JoinKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for JoinKey {}

impl PartialOrd for JoinKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JoinKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_pieces(&self.pieces, &other.pieces)
    }
}

/// Size of the unified location for `pieces`: the sum of the piece sizes,
/// or `logical` when larger. A single piece must be extended.
pub(crate) fn unified_size(pieces: &[VarnodeData], logical: usize) -> Result<usize, Error> {
    if pieces.is_empty() {
        return Err(Error::NoPieces);
    }

    let total = pieces.iter().map(VarnodeData::size).sum::<usize>();
    let size = total.max(logical);

    if size == 0 {
        return Err(Error::ZeroSize);
    }

    if pieces.len() == 1 && size <= total {
        return Err(Error::MissingExtension {
            size: total,
            logical,
        });
    }

    Ok(size)
}
