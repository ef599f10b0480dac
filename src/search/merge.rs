use super::token::PartitionCursor;
use crate::catalog::types::{PartitionKey, PartitionPage, ScoredCard};

use std::cmp::Ordering;

/// Hits fetched from one partition, starting at `offset` of its ranked matches.
#[derive(Debug, Clone)]
pub struct PartitionHits {
    pub partition: PartitionKey,
    pub offset: usize,
    pub page: PartitionPage,
}

#[derive(Debug, Default)]
pub struct MergedPage {
    pub hits: Vec<ScoredCard>,
    /// Where each partition that may still have matches continues.
    pub cursors: Vec<PartitionCursor>,
}

fn merge_order(a: &ScoredCard, b: &ScoredCard) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| a.record.sort_key.cmp(&b.record.sort_key))
        .then_with(|| a.record.partition_key.cmp(&b.record.partition_key))
}

/// K-way merge of per-partition pages by `(rank, sort_key, partition)`.
///
/// Stops at `limit` hits, or as soon as a partition that is not exhausted has no fetched
/// hit left: its next unfetched hit could sort before anything still buffered elsewhere.
pub fn merge_pages(pages: Vec<PartitionHits>, limit: usize) -> MergedPage {
    let mut positions = vec![0usize; pages.len()];
    let mut hits = Vec::with_capacity(limit);

    while hits.len() < limit {
        let starved = pages
            .iter()
            .zip(positions.iter())
            .any(|(p, &pos)| pos >= p.page.hits.len() && !p.page.exhausted);
        if starved {
            break;
        }

        let next = pages
            .iter()
            .enumerate()
            .filter(|(i, p)| positions[*i] < p.page.hits.len())
            .min_by(|(i, a), (j, b)| {
                merge_order(&a.page.hits[positions[*i]], &b.page.hits[positions[*j]])
            })
            .map(|(i, _)| i);

        match next {
            Some(i) => {
                hits.push(pages[i].page.hits[positions[i]].clone());
                positions[i] += 1;
            }
            None => break,
        }
    }

    let cursors = pages
        .iter()
        .zip(positions.iter())
        .filter(|(p, pos)| **pos < p.page.hits.len() || !p.page.exhausted)
        .map(|(p, &pos)| PartitionCursor {
            partition: p.partition.clone(),
            offset: p.offset + pos,
        })
        .collect();

    MergedPage { hits, cursors }
}
