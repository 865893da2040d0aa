use candle_core::{Device, Tensor};
use posegnn_core::{BatchedPeriodicDistance, EdgeList, Structure, StructureBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

// Section: helpers ----------------------------------------------------------

fn random_cell(rng: &mut StdRng) -> [[f64; 3]; 3] {
    [
        [rng.gen_range(3.0..5.0), 0.0, 0.0],
        [rng.gen_range(-1.0..1.0), rng.gen_range(3.0..5.0), 0.0],
        [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(3.0..5.0)],
    ]
}

/// Atoms at random fractional coordinates in `[-0.5, 1.5)`, so some sit outside the cell.
fn random_crystal(rng: &mut StdRng, n_atoms: usize) -> Structure {
    let cell = random_cell(rng);
    let positions = (0..n_atoms)
        .map(|_| {
            let f: [f64; 3] = [rng.gen_range(-0.5..1.5), rng.gen_range(-0.5..1.5), rng.gen_range(-0.5..1.5)];
            let mut p = [0.0; 3];
            for (k, row) in cell.iter().enumerate() {
                for d in 0..3 {
                    p[d] += f[k] * row[d];
                }
            }
            p
        })
        .collect();
    let atomic_numbers = (0..n_atoms).map(|_| rng.gen_range(1..20)).collect();
    Structure::periodic(positions, atomic_numbers, cell)
}

fn random_molecule(rng: &mut StdRng, n_atoms: usize) -> Structure {
    let positions = (0..n_atoms)
        .map(|_| [rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0)])
        .collect();
    Structure::molecule(positions, vec![6; n_atoms])
}

fn build(batch: &StructureBatch, cutoff: f64) -> EdgeList {
    BatchedPeriodicDistance::new(cutoff)
        .unwrap()
        .forward(batch.positions(), batch.cell(), batch.batch())
        .unwrap()
}

/// Every (source, target, shift) within the cutoff, found by scanning a generous
/// block of translations. Indices are local to the structure.
fn brute_force(structure: &Structure, cutoff: f64) -> HashSet<(usize, usize, [i32; 3])> {
    let range: i32 = if structure.cell.is_some() { 6 } else { 0 };
    let cell = structure.cell.unwrap_or([[0.0; 3]; 3]);
    let mut found = HashSet::new();
    for (i, p) in structure.positions.iter().enumerate() {
        for (j, q) in structure.positions.iter().enumerate() {
            for a in -range..=range {
                for b in -range..=range {
                    for c in -range..=range {
                        if i == j && (a, b, c) == (0, 0, 0) {
                            continue;
                        }
                        let mut d2 = 0.0;
                        for d in 0..3 {
                            let offset = a as f64 * cell[0][d] + b as f64 * cell[1][d] + c as f64 * cell[2][d];
                            let v = q[d] + offset - p[d];
                            d2 += v * v;
                        }
                        if d2 <= cutoff * cutoff {
                            found.insert((i, j, [a, b, c]));
                        }
                    }
                }
            }
        }
    }
    found
}

fn mixed_batch(seed: u64) -> Vec<Structure> {
    let mut rng = StdRng::seed_from_u64(seed);
    vec![
        random_crystal(&mut rng, 5),
        random_molecule(&mut rng, 6),
        random_crystal(&mut rng, 3),
        random_crystal(&mut rng, 1),
    ]
}

// Section: properties -------------------------------------------------------

#[test]
fn test_matches_brute_force() {
    for seed in 0..5 {
        let structures = mixed_batch(seed);
        let batch = StructureBatch::from_structures(&structures, &Device::Cpu).unwrap();
        let cutoff = 3.0;
        let edges = build(&batch, cutoff);

        let mut offset = 0;
        for (s, structure) in structures.iter().enumerate() {
            let expected = brute_force(structure, cutoff);
            let got: HashSet<_> = edges
                .edges
                .iter()
                .filter(|e| e.structure == s)
                .map(|e| (e.source - offset, e.target - offset, e.shift))
                .collect();
            assert_eq!(got, expected, "seed {seed}, structure {s}");
            offset += structure.num_atoms();
        }
    }
}

#[test]
fn test_batch_isolation_and_cutoff() {
    let structures = mixed_batch(42);
    let batch = StructureBatch::from_structures(&structures, &Device::Cpu).unwrap();
    let edges = build(&batch, 2.5);
    let owner = batch.batch().to_vec1::<u32>().unwrap();

    let mut seen = HashSet::new();
    for e in &edges.edges {
        assert_eq!(owner[e.source], owner[e.target]);
        assert_eq!(owner[e.source] as usize, e.structure);
        assert!(e.distance > 0.0 && e.distance <= 2.5);
        assert!(seen.insert((e.source, e.target, e.shift)), "duplicate edge {e:?}");
        assert_eq!(edges.translations[e.shift_index as usize], e.shift);
    }

    let distance = edges.edge_distance.to_vec1::<f64>().unwrap();
    assert_eq!(distance.len(), edges.len());
    assert!(distance.iter().all(|d| *d > 0.0 && *d <= 2.5));
}

#[test]
fn test_edge_tensors_agree_with_host_edges() {
    let structures = mixed_batch(7);
    let batch = StructureBatch::from_structures(&structures, &Device::Cpu).unwrap();
    let edges = build(&batch, 3.0);

    let index = edges.edge_index.to_vec2::<u32>().unwrap();
    let distance = edges.edge_distance.to_vec1::<f64>().unwrap();
    let vectors = edges.edge_vector.to_vec2::<f64>().unwrap();
    let shift_index = edges.shift_index.to_vec1::<u32>().unwrap();
    for (k, e) in edges.edges.iter().enumerate() {
        assert_eq!(index[0][k] as usize, e.source);
        assert_eq!(index[1][k] as usize, e.target);
        assert_eq!(shift_index[k], e.shift_index);
        let norm = vectors[k].iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - distance[k]).abs() < 1e-10);
        assert!((distance[k] - e.distance).abs() < 1e-10);
    }
}

#[test]
fn test_deterministic() {
    let structures = mixed_batch(3);
    let batch = StructureBatch::from_structures(&structures, &Device::Cpu).unwrap();
    let first = build(&batch, 3.0);
    let second = build(&batch, 3.0);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.translations, second.translations);
    assert_eq!(
        first.shift_index.to_vec1::<u32>().unwrap(),
        second.shift_index.to_vec1::<u32>().unwrap()
    );
}

#[test]
fn test_lattice_translation_of_an_atom_keeps_distances() {
    let mut rng = StdRng::seed_from_u64(11);
    let crystal = random_crystal(&mut rng, 4);
    let mut moved = crystal.clone();
    let cell = crystal.cell.unwrap();
    for d in 0..3 {
        moved.positions[2][d] += 2.0 * cell[0][d] - cell[2][d];
    }

    let distances = |s: &Structure| {
        let batch = StructureBatch::from_structures(std::slice::from_ref(s), &Device::Cpu).unwrap();
        let mut pairs: Vec<(usize, usize, f64)> = build(&batch, 3.0)
            .edges
            .iter()
            .map(|e| (e.source, e.target, e.distance))
            .collect();
        pairs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)).then(a.2.total_cmp(&b.2)));
        pairs
    };
    let before = distances(&crystal);
    let after = distances(&moved);
    assert_eq!(before.len(), after.len());
    for (x, y) in before.iter().zip(after.iter()) {
        assert_eq!((x.0, x.1), (y.0, y.1));
        assert!((x.2 - y.2).abs() < 1e-9);
    }
}

#[test]
fn test_atom_far_outside_the_cell() {
    let mut rng = StdRng::seed_from_u64(23);
    let crystal = random_crystal(&mut rng, 4);
    let cell = crystal.cell.unwrap();
    let far = [250, 0, -120];
    let mut moved = crystal.clone();
    for d in 0..3 {
        moved.positions[1][d] += (0..3).map(|k| far[k] as f64 * cell[k][d]).sum::<f64>();
    }

    let search = |s: &Structure| {
        let batch = StructureBatch::from_structures(std::slice::from_ref(s), &Device::Cpu).unwrap();
        build(&batch, 3.0).edges
    };
    let expected: HashSet<_> = brute_force(&crystal, 3.0);
    let before = search(&crystal);
    let after = search(&moved);
    assert_eq!(before.len(), expected.len());
    assert_eq!(after.len(), before.len());

    // shifts compensate the lattice translation of atom 1
    let adjusted: HashSet<_> = after
        .iter()
        .map(|e| {
            let mut shift = e.shift;
            for k in 0..3 {
                if e.target == 1 {
                    shift[k] += far[k];
                }
                if e.source == 1 {
                    shift[k] -= far[k];
                }
            }
            (e.source, e.target, shift)
        })
        .collect();
    assert_eq!(adjusted, expected);

    for (x, y) in before.iter().zip(after.iter()) {
        assert_eq!((x.source, x.target), (y.source, y.target));
        assert!((x.distance - y.distance).abs() < 1e-8);
    }
}

#[test]
fn test_interleaved_batch_index() {
    let dev = Device::Cpu;
    // structure 0 owns atoms 0 and 2, structure 1 owns atoms 1 and 3
    let positions = Tensor::new(
        &[[0.0f64, 0.0, 0.0], [0.0, 0.0, 0.5], [1.0, 0.0, 0.0], [0.0, 0.0, 1.2]],
        &dev,
    )
    .unwrap();
    let z = Tensor::new(&[1u32, 1, 1, 1], &dev).unwrap();
    let cell = Tensor::zeros((2, 3, 3), candle_core::DType::F64, &dev).unwrap();
    let index = Tensor::new(&[0u32, 1, 0, 1], &dev).unwrap();
    let batch = StructureBatch::new(positions, z, cell, index).unwrap();

    let edges = build(&batch, 1.5);
    let pairs: Vec<_> = edges.edges.iter().map(|e| (e.source, e.target)).collect();
    assert_eq!(pairs, vec![(0, 2), (2, 0), (1, 3), (3, 1)]);
}

// Section: worked examples --------------------------------------------------

#[test]
fn test_two_atom_molecule() {
    let molecule = Structure::molecule(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]], vec![1, 1]);
    let batch = StructureBatch::from_structures(&[molecule], &Device::Cpu).unwrap();
    let edges = build(&batch, 2.0);
    assert_eq!(edges.len(), 2);
    for e in &edges.edges {
        assert_eq!(e.distance, 1.0);
        assert_eq!(edges.translations[e.shift_index as usize], [0, 0, 0]);
    }
}

#[test]
fn test_wrapped_cube_and_lone_atom() {
    let cube = Structure::periodic(
        vec![[0.0, 0.0, 0.0], [4.9, 0.0, 0.0]],
        vec![6, 6],
        [[5.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]],
    );
    let lone = Structure::molecule(vec![[0.0, 0.0, 0.0]], vec![1]);
    let batch = StructureBatch::from_structures(&[cube, lone], &Device::Cpu).unwrap();
    let edges = build(&batch, 1.0);
    assert_eq!(edges.edges.iter().filter(|e| e.structure == 0).count(), 2);
    assert_eq!(edges.edges.iter().filter(|e| e.structure == 1).count(), 0);
}
