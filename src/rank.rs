use std::collections::HashMap;

use anyhow::Result;

use crate::db::{Database, RankingRow};

const ITERATIONS: usize = 20;
const DAMPING: f64 = 0.85;

/// Run the power iteration over the full symbol/edge graph and replace the
/// rankings table with the new generation, in its own transaction. Returns
/// the number of symbols ranked.
///
/// Dangling symbols (out-degree 0) redistribute their mass uniformly, which
/// keeps the rank vector stochastic without a normalization step.
pub fn recompute(db: &Database) -> Result<usize> {
    let ids = db.all_symbol_ids()?;
    let n = ids.len();
    if n == 0 {
        db.with_transaction(|| db.replace_rankings(&[]))?;
        return Ok(0);
    }

    let index: HashMap<i64, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0i64; n];
    for (from, to) in db.all_edges()? {
        if let (Some(&f), Some(&t)) = (index.get(&from), index.get(&to)) {
            outgoing[f].push(t);
            in_degree[t] += 1;
        }
    }

    let uniform = 1.0 / n as f64;
    let mut ranks = vec![uniform; n];
    let mut next = vec![0.0f64; n];

    for _ in 0..ITERATIONS {
        let base = (1.0 - DAMPING) * uniform;
        for v in next.iter_mut() {
            *v = base;
        }
        for (i, out) in outgoing.iter().enumerate() {
            if out.is_empty() {
                let share = DAMPING * ranks[i] * uniform;
                for v in next.iter_mut() {
                    *v += share;
                }
            } else {
                let share = DAMPING * ranks[i] / out.len() as f64;
                for &j in out {
                    next[j] += share;
                }
            }
        }
        std::mem::swap(&mut ranks, &mut next);
    }

    let rows: Vec<RankingRow> = ids
        .iter()
        .enumerate()
        .map(|(i, &id)| RankingRow {
            symbol_id: id,
            rank: ranks[i],
            in_degree: in_degree[i],
            out_degree: outgoing[i].len() as i64,
        })
        .collect();

    db.with_transaction(|| db.replace_rankings(&rows))?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(db: &Database, count: usize) -> Vec<i64> {
        let (file_id, _) = db
            .upsert_file("cycle.ts", Some("typescript"), "1111222233334444", 1)
            .unwrap();
        (0..count)
            .map(|i| {
                db.insert_symbol(
                    file_id,
                    &format!("s{i}"),
                    None,
                    "function",
                    1,
                    1,
                    None,
                    None,
                    None,
                    true,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_graph_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(recompute(&db).unwrap(), 0);
        assert_eq!(db.ranking_sum().unwrap(), 0.0);
    }

    #[test]
    fn ten_symbol_cycle_ranks_uniformly() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed(&db, 10);
        for i in 0..10 {
            db.insert_edge(ids[i], ids[(i + 1) % 10], "calls").unwrap();
        }
        assert_eq!(recompute(&db).unwrap(), 10);

        let rows = db.top_ranked(10).unwrap();
        assert_eq!(rows.len(), 10);
        for (row, in_degree, out_degree) in rows {
            assert!((row.rank - 0.1).abs() < 1e-6, "rank {} for {}", row.rank, row.name);
            assert_eq!(in_degree, 1);
            assert_eq!(out_degree, 1);
        }
    }

    #[test]
    fn rank_mass_is_conserved() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed(&db, 5);
        db.insert_edge(ids[0], ids[1], "calls").unwrap();
        db.insert_edge(ids[0], ids[2], "calls").unwrap();
        db.insert_edge(ids[3], ids[1], "references").unwrap();
        // ids[4] is dangling
        recompute(&db).unwrap();
        let sum = db.ranking_sum().unwrap();
        assert!((sum - 1.0).abs() < 1e-6, "sum was {sum}");
    }

    #[test]
    fn hub_outranks_leaves() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed(&db, 4);
        // everyone points at ids[0]
        for &from in &ids[1..] {
            db.insert_edge(from, ids[0], "calls").unwrap();
        }
        recompute(&db).unwrap();
        let rows = db.top_ranked(4).unwrap();
        assert_eq!(rows[0].0.id, ids[0]);
        assert!(rows[0].0.rank > rows[1].0.rank);
    }

    #[test]
    fn recompute_covers_every_symbol() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed(&db, 3);
        db.insert_edge(ids[0], ids[1], "calls").unwrap();
        recompute(&db).unwrap();
        let (_, symbols, _, _) = db.counts().unwrap();
        let ranked = db.top_ranked(100).unwrap().len() as i64;
        assert_eq!(ranked, symbols);
    }
}
