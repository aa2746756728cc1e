//! Vector index behavior and persistence

use kpath_application::VectorIndex;
use std::collections::HashMap;

fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

#[test]
fn add_and_search_orders_by_similarity() {
    let mut index = VectorIndex::new(4);
    index.add(1, &unit(4, 0)).unwrap();
    index.add(2, &unit(4, 1)).unwrap();
    index.add(3, &[0.9, 0.1, 0.0, 0.0]).unwrap();

    let results = index.search(&unit(4, 0), 3).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, 1);
    assert_eq!(results[1].0, 3);
    // scores are non-increasing and bounded
    assert!(results[0].1 >= results[1].1 && results[1].1 >= results[2].1);
    assert!(results.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
}

#[test]
fn duplicate_id_is_rejected() {
    let mut index = VectorIndex::new(2);
    index.add(1, &[1.0, 0.0]).unwrap();
    assert!(index.add(1, &[0.0, 1.0]).is_err());
}

#[test]
fn dimension_mismatch_is_an_error() {
    let mut index = VectorIndex::new(3);
    assert!(index.add(1, &[1.0, 0.0]).is_err());
    index.add(1, &[1.0, 0.0, 0.0]).unwrap();
    assert!(index.search(&[1.0, 0.0], 1).is_err());
    assert!(index.update(1, &[1.0]).is_err());
}

#[test]
fn empty_index_returns_empty_results() {
    let index = VectorIndex::new(2);
    assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
}

#[test]
fn zero_query_returns_zero_scores_without_error() {
    let mut index = VectorIndex::new(2);
    index.add(1, &[1.0, 0.0]).unwrap();
    index.add(2, &[0.0, 1.0]).unwrap();

    let results = index.search(&[0.0, 0.0], 2).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, score)| *score == 0.0));
}

#[test]
fn search_caps_k_at_index_size() {
    let mut index = VectorIndex::new(2);
    index.add(1, &[1.0, 0.0]).unwrap();
    assert_eq!(index.search(&[1.0, 0.0], 50).unwrap().len(), 1);
}

#[test]
fn remove_compacts_and_preserves_id_positions() {
    let mut index = VectorIndex::new(2);
    index.add(1, &[1.0, 0.0]).unwrap();
    index.add(2, &[0.0, 1.0]).unwrap();
    index.add(3, &[0.7, 0.7]).unwrap();

    assert!(index.remove(1));
    assert!(!index.remove(1));
    assert_eq!(index.len(), 2);
    assert!(!index.contains(1));

    // remaining entries still resolve to their own vectors
    let results = index.search(&[0.0, 1.0], 1).unwrap();
    assert_eq!(results[0].0, 2);
}

#[test]
fn add_then_remove_restores_prior_id_set() {
    let mut index = VectorIndex::new(2);
    index.add(1, &[1.0, 0.0]).unwrap();
    index.add(2, &[0.0, 1.0]).unwrap();
    let mut before: Vec<i32> = index.ids().to_vec();
    before.sort_unstable();

    index.add(9, &[0.5, 0.5]).unwrap();
    assert!(index.remove(9));

    let mut after: Vec<i32> = index.ids().to_vec();
    after.sort_unstable();
    assert_eq!(before, after);
}

#[test]
fn update_equals_remove_then_add_for_search() {
    let query = [0.6f32, 0.8];

    let mut updated = VectorIndex::new(2);
    updated.add(1, &[1.0, 0.0]).unwrap();
    updated.add(2, &[0.0, 1.0]).unwrap();
    assert!(updated.update(2, &[0.3, 0.9]).unwrap());

    let mut readded = VectorIndex::new(2);
    readded.add(1, &[1.0, 0.0]).unwrap();
    readded.add(2, &[0.0, 1.0]).unwrap();
    assert!(readded.remove(2));
    readded.add(2, &[0.3, 0.9]).unwrap();

    let a = updated.search(&query, 2).unwrap();
    let b = readded.search(&query, 2).unwrap();
    assert_eq!(a.len(), b.len());
    for ((id_a, score_a), (id_b, score_b)) in a.iter().zip(b.iter()) {
        assert_eq!(id_a, id_b);
        assert!((score_a - score_b).abs() < 1e-5);
    }
}

#[test]
fn update_of_unknown_id_returns_false() {
    let mut index = VectorIndex::new(2);
    assert!(!index.update(42, &[1.0, 0.0]).unwrap());
}

#[test]
fn build_replaces_contents_atomically() {
    let mut index = VectorIndex::new(2);
    index.add(1, &[1.0, 0.0]).unwrap();

    index
        .build(vec![0.0, 1.0, 1.0, 0.0], vec![10, 20])
        .unwrap();
    assert_eq!(index.len(), 2);
    assert!(!index.contains(1));
    assert_eq!(index.search(&[0.0, 1.0], 1).unwrap()[0].0, 10);
}

#[test]
fn build_rejects_shape_mismatch_and_duplicates() {
    let mut index = VectorIndex::new(2);
    assert!(index.build(vec![1.0, 0.0, 0.0], vec![1, 2]).is_err());
    assert!(index
        .build(vec![1.0, 0.0, 0.0, 1.0], vec![1, 1])
        .is_err());
}

#[test]
fn save_load_round_trip_preserves_search_output() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("search_index");

    let mut index = VectorIndex::new(3);
    index.add(1, &[1.0, 0.0, 0.0]).unwrap();
    index.add(2, &[0.0, 1.0, 0.0]).unwrap();
    index.add(3, &[0.5, 0.5, 0.0]).unwrap();
    index.save(&base, None).unwrap();

    let (loaded, map) = VectorIndex::load(&base).unwrap();
    assert!(map.is_none());
    assert_eq!(loaded.dimension(), 3);
    assert_eq!(loaded.len(), 3);

    let query = [0.8f32, 0.2, 0.0];
    let before = index.search(&query, 3).unwrap();
    let after = loaded.search(&query, 3).unwrap();
    for ((id_a, score_a), (id_b, score_b)) in before.iter().zip(after.iter()) {
        assert_eq!(id_a, id_b);
        assert!((score_a - score_b).abs() < 1e-5);
    }
}

#[test]
fn save_load_round_trip_carries_service_map() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("tool_search_index");

    let mut index = VectorIndex::new(2);
    index.add(7, &[1.0, 0.0]).unwrap();
    let mut map = HashMap::new();
    map.insert(7, 3);
    index.save(&base, Some(&map)).unwrap();

    let (_, loaded_map) = VectorIndex::load(&base).unwrap();
    assert_eq!(loaded_map.unwrap().get(&7), Some(&3));
}

#[test]
fn load_of_missing_files_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(VectorIndex::load(&dir.path().join("missing")).is_err());
    assert!(!VectorIndex::exists(&dir.path().join("missing")));
}
