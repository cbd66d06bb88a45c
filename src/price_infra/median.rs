use crate::types::ids::SourceId;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// One source observation that passed the staleness and deviation filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidInput {
    pub source_id: SourceId,
    pub price: Price,
    pub weight: u32,
    pub timestamp: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MedianPick {
    pub price: Price,
    pub timestamp: Timestamp,
    /// False only if the walk ended without reaching the cutoff and the
    /// last sorted entry was used instead.
    pub cutoff_reached: bool,
}

/// Weighted median with cutoff `ceil(total / 2)`.
///
/// Entries are insertion-sorted by price, which keeps equal prices in input
/// order. Inputs are bounded by the registry capacity.
pub fn weighted_median(inputs: &[ValidInput]) -> Option<MedianPick> {
    if inputs.is_empty() {
        return None;
    }

    let mut order: Vec<usize> = (0..inputs.len()).collect();
    for i in 1..order.len() {
        let mut j = i;
        while j > 0 && inputs[order[j - 1]].price > inputs[order[j]].price {
            order.swap(j - 1, j);
            j -= 1;
        }
    }

    let total_weight: u64 = inputs.iter().map(|input| input.weight as u64).sum();
    let cutoff = (total_weight + 1) / 2;

    let mut cumulative: u64 = 0;
    for &index in &order {
        cumulative += inputs[index].weight as u64;
        if cumulative >= cutoff {
            return Some(MedianPick {
                price: inputs[index].price,
                timestamp: inputs[index].timestamp,
                cutoff_reached: true,
            });
        }
    }

    let last = &inputs[order[order.len() - 1]];
    tracing::error!(
        total_weight,
        cutoff,
        "Weighted median walk never reached cutoff, using highest price"
    );
    Some(MedianPick {
        price: last.price,
        timestamp: last.timestamp,
        cutoff_reached: false,
    })
}
