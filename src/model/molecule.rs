//! Minimal 3-D molecule handed to the descriptor builder.
//!
//! Parsing, conformer generation and pharmacophore perception happen
//! upstream. This type only carries their results: atoms, bonds, one
//! coordinate set per conformer and the perceived pharmacophore points.

use serde::{Deserialize, Serialize};

/// Atom of the input structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    pub atomic_no: u8,
}

impl Atom {
    pub fn new(atomic_no: u8) -> Self {
        Self { atomic_no }
    }

    pub fn is_hydrogen(&self) -> bool {
        self.atomic_no == 1
    }
}

/// A perceived pharmacophore point: the atoms it spans and its interaction types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacophorePoint {
    pub atoms: Vec<usize>,
    pub interaction_types: Vec<u32>,
}

/// Molecule with a conformer ensemble and pharmacophore points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<[usize; 2]>,
    /// One coordinate per atom, per conformer.
    pub conformers: Vec<Vec<[f64; 3]>>,
    pub points: Vec<PharmacophorePoint>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_atoms(mut self, atoms: impl IntoIterator<Item = u8>) -> Self {
        self.atoms = atoms.into_iter().map(Atom::new).collect();
        self
    }

    pub fn with_bond(mut self, a: usize, b: usize) -> Self {
        self.bonds.push([a, b]);
        self
    }

    pub fn with_conformer(mut self, coords: Vec<[f64; 3]>) -> Self {
        self.conformers.push(coords);
        self
    }

    pub fn with_point(mut self, atoms: Vec<usize>, interaction_types: Vec<u32>) -> Self {
        self.points.push(PharmacophorePoint { atoms, interaction_types });
        self
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.is_hydrogen()).count()
    }

    /// Connected components over the bond list, each sorted by atom index.
    pub fn fragments(&self) -> Vec<Vec<usize>> {
        let n = self.atoms.len();
        let mut adjacency = vec![Vec::new(); n];
        for &[a, b] in &self.bonds {
            if a < n && b < n {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }

        let mut seen = vec![false; n];
        let mut fragments = Vec::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut fragment = Vec::new();
            while let Some(atom) = stack.pop() {
                fragment.push(atom);
                for &next in &adjacency[atom] {
                    if !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }
            fragment.sort_unstable();
            fragments.push(fragment);
        }
        fragments
    }

    /// Keep only the fragment with the most heavy atoms.
    ///
    /// Coordinates and pharmacophore points are remapped to the new atom
    /// indices; points touching a removed atom are dropped.
    pub fn strip_small_fragments(&self) -> Molecule {
        let fragments = self.fragments();
        if fragments.len() <= 1 {
            return self.clone();
        }
        let heavy = |frag: &[usize]| frag.iter().filter(|&&a| !self.atoms[a].is_hydrogen()).count();
        // max_by_key keeps the last maximum; prefer the first fragment on ties
        let Some(keep) = fragments
            .iter()
            .enumerate()
            .max_by_key(|(k, f)| (heavy(f.as_slice()), std::cmp::Reverse(*k)))
            .map(|(_, f)| f)
        else {
            return self.clone();
        };

        let mut new_index = vec![None; self.atoms.len()];
        for (new, &old) in keep.iter().enumerate() {
            new_index[old] = Some(new);
        }

        let atoms = keep.iter().map(|&a| self.atoms[a]).collect();
        let bonds = self
            .bonds
            .iter()
            .filter_map(|&[a, b]| Some([(*new_index.get(a)?)?, (*new_index.get(b)?)?]))
            .collect();
        let conformers = self
            .conformers
            .iter()
            .map(|coords| keep.iter().filter_map(|&a| coords.get(a).copied()).collect())
            .collect();
        let points = self
            .points
            .iter()
            .filter_map(|p| {
                let atoms = p
                    .atoms
                    .iter()
                    .map(|&a| new_index.get(a).copied().flatten())
                    .collect::<Option<Vec<_>>>()?;
                Some(PharmacophorePoint { atoms, interaction_types: p.interaction_types.clone() })
            })
            .collect();

        Molecule { atoms, bonds, conformers, points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_fragments() -> Molecule {
        // C-C-O plus a separate Na
        Molecule::new()
            .with_atoms([6, 6, 11, 8])
            .with_bond(0, 1)
            .with_bond(1, 3)
            .with_conformer(vec![[0.0; 3], [1.5, 0.0, 0.0], [9.0, 9.0, 9.0], [3.0, 0.0, 0.0]])
            .with_point(vec![3], vec![7])
            .with_point(vec![2], vec![9])
    }

    #[test]
    fn fragments_follow_bonds() {
        let frags = two_fragments().fragments();
        assert_eq!(frags, vec![vec![0, 1, 3], vec![2]]);
    }

    #[test]
    fn strip_keeps_largest_fragment_and_remaps() {
        let mol = two_fragments().strip_small_fragments();
        assert_eq!(mol.atoms.len(), 3);
        assert_eq!(mol.bonds, vec![[0, 1], [1, 2]]);
        assert_eq!(mol.conformers[0][2], [3.0, 0.0, 0.0]);
        assert_eq!(mol.points.len(), 1);
        assert_eq!(mol.points[0].atoms, vec![2]);
        assert_eq!(mol.points[0].interaction_types, vec![7]);
    }

    #[test]
    fn heavy_atoms_exclude_hydrogen() {
        let mol = Molecule::new().with_atoms([6, 1, 1, 8]);
        assert_eq!(mol.heavy_atom_count(), 2);
    }
}
