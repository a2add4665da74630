use super::InternalId;

/// Internal ids of the records sharing one (property, token) pair.
///
/// Ids arrive in increasing order, so the list stays sorted without work at
/// commit time. Past the size cap the contents are dropped for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bucket {
    Open(Vec<InternalId>),
    Saturated,
}

impl Default for Bucket {
    fn default() -> Self {
        Bucket::Open(Vec::new())
    }
}

impl Bucket {
    /// Add an id. Returns true if this push saturated the bucket.
    pub fn push(&mut self, id: InternalId, max_size: usize) -> bool {
        let Bucket::Open(ids) = self else {
            return false;
        };
        match ids.last() {
            Some(last) if *last == id => return false,
            Some(last) if *last > id => {
                // out of order ids are tolerated, at the cost of a sort
                let pos = ids.partition_point(|x| *x < id);
                if ids.get(pos) == Some(&id) {
                    return false;
                }
                ids.insert(pos, id);
            }
            _ => ids.push(id),
        }
        if ids.len() > max_size {
            *self = Bucket::Saturated;
            return true;
        }
        false
    }

    pub fn is_saturated(&self) -> bool {
        matches!(self, Bucket::Saturated)
    }

    /// Ids below `watermark`, i.e. those already committed.
    pub fn visible(&self, watermark: InternalId) -> &[InternalId] {
        match self {
            Bucket::Open(ids) => &ids[..ids.partition_point(|id| *id < watermark)],
            Bucket::Saturated => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Bucket::Open(ids) => ids.len(),
            Bucket::Saturated => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Specificity of a bucket: rare tokens say more than common ones.
pub(crate) fn specificity(size: usize) -> f64 {
    if size == 0 {
        1.0
    } else {
        1.0 / ((size + 1) as f64).ln()
    }
}
