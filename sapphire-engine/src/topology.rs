//! Mesh topologies.
//!
//! Each builder clears the mesh, adds balls and springs, and returns the
//! [`MeshAudioParameters`] that say where stereo audio goes in and out.
//!
//! - [`create_string`]     : 30 mobile balls in a line between two anchors
//! - [`create_round_drum`] : disc of mobile balls on a square lattice, anchored at the rim
//! - [`create_hex`]        : hexagonal lattice, 3 springs per mobile ball
//! - [`elastika_mesh`]     : the fixed 34-ball layout used by [`crate::elastika`]

use sapphire_core::vector::PhysicsVector;

use crate::error::MeshError;
use crate::mesh::{Ball, MeshAudioParameters, PhysicsMesh, Spring, MESH_DEFAULT_REST_LENGTH};

const MOBILE_MASS: f64 = 1.0e-6;

// ------------------------------------ String -------------------------------------

pub const STRING_MOBILE_BALLS: usize = 30;

pub fn create_string(mesh: &mut PhysicsMesh) -> Result<MeshAudioParameters, MeshError> {
    let n = STRING_MOBILE_BALLS;
    let spacing = MESH_DEFAULT_REST_LENGTH;

    mesh.clear();
    mesh.add_ball(Ball::anchor(PhysicsVector::zero()));
    for b in 1..=n {
        mesh.add_ball(Ball::new(MOBILE_MASS, PhysicsVector::new(b as f64 * spacing, 0.0, 0.0)));
    }
    mesh.add_ball(Ball::anchor(PhysicsVector::new((n + 1) as f64 * spacing, 0.0, 0.0)));

    for s in 0..=n {
        mesh.add_spring(Spring::new(s, s + 1))?;
    }

    Ok(MeshAudioParameters::with_taps(3, 6, n - 3, n - 6))
}

// ----------------------------------- Round drum ----------------------------------

/// Square table of ball indices addressed by signed lattice coordinates.
struct ImageMap {
    reach: i32,
    table: Vec<Option<usize>>,
}

impl ImageMap {
    /// Covers `[-(radius+1), radius+1]` on both axes so rim anchors fit.
    fn new(radius: i32) -> Self {
        let reach = radius + 1;
        let width = (2 * reach + 1) as usize;
        Self { reach, table: vec![None; width * width] }
    }

    fn slot(&self, i: i32, j: i32) -> Result<usize, MeshError> {
        if i.abs() > self.reach || j.abs() > self.reach {
            return Err(MeshError::GridOutOfRange { u: i, v: j });
        }
        let width = 2 * self.reach + 1;
        Ok(((i + self.reach) + width * (j + self.reach)) as usize)
    }

    fn get(&self, i: i32, j: i32) -> Option<usize> {
        self.slot(i, j).ok().and_then(|s| self.table[s])
    }

    fn store(&mut self, i: i32, j: i32, index: usize) -> Result<(), MeshError> {
        let s = self.slot(i, j)?;
        self.table[s] = Some(index);
        Ok(())
    }

    /// The ball at `(i, j)`, creating an anchor there if the cell is empty.
    fn anchor_index(&mut self, mesh: &mut PhysicsMesh, i: i32, j: i32, spacing: f64) -> Result<usize, MeshError> {
        if let Some(index) = self.get(i, j) {
            return Ok(index);
        }
        let pos = PhysicsVector::new(f64::from(i) * spacing, f64::from(j) * spacing, 0.0);
        let index = mesh.add_ball(Ball::anchor(pos));
        self.store(i, j, index)?;
        Ok(index)
    }

    fn require(&self, i: i32, j: i32) -> Result<usize, MeshError> {
        self.get(i, j).ok_or(MeshError::EmptyGridCell { u: i, v: j })
    }
}

pub const DRUM_RADIUS: i32 = 3;

pub fn create_round_drum(mesh: &mut PhysicsMesh) -> Result<MeshAudioParameters, MeshError> {
    let r = DRUM_RADIUS;
    let spacing = MESH_DEFAULT_REST_LENGTH;
    let inside = |i: i32, j: i32| i * i + j * j <= r * r;

    mesh.clear();
    let mut map = ImageMap::new(r);

    for i in -r..=r {
        for j in -r..=r {
            if inside(i, j) {
                let pos = PhysicsVector::new(f64::from(i) * spacing, f64::from(j) * spacing, 0.0);
                let index = mesh.add_ball(Ball::new(MOBILE_MASS, pos));
                map.store(i, j, index)?;
            }
        }
    }

    // Up and +x springs for every ball; down and -x only where the neighbour
    // is outside the disc, so interior pairs are linked once.
    for i in -r..=r {
        for j in -r..=r {
            if !inside(i, j) {
                continue;
            }
            let here = map.require(i, j)?;

            let above = map.anchor_index(mesh, i, j + 1, spacing)?;
            mesh.add_spring(Spring::new(here, above))?;

            let beside = map.anchor_index(mesh, i + 1, j, spacing)?;
            mesh.add_spring(Spring::new(here, beside))?;

            if !inside(i, j - 1) {
                let below = map.anchor_index(mesh, i, j - 1, spacing)?;
                mesh.add_spring(Spring::new(here, below))?;
            }

            if !inside(i - 1, j) {
                let other = map.anchor_index(mesh, i - 1, j, spacing)?;
                mesh.add_spring(Spring::new(here, other))?;
            }
        }
    }

    Ok(MeshAudioParameters::with_taps(
        map.require(-2, -1)?,
        map.require(-2, 1)?,
        map.require(1, -2)?,
        map.require(1, 2)?,
    ))
}

// ------------------------------------- Hex ---------------------------------------

const DIR_E: u8 = 1 << 0;
const DIR_N: u8 = 1 << 1;
const DIR_NW: u8 = 1 << 2;
const DIR_W: u8 = 1 << 3;
const DIR_S: u8 = 1 << 4;
const DIR_SE: u8 = 1 << 5;

/// Each direction with its lattice step.
const DIRECTIONS: [(u8, i32, i32); 6] = [
    (DIR_E, 1, 0),
    (DIR_N, 0, 1),
    (DIR_NW, -1, 1),
    (DIR_W, -1, 0),
    (DIR_S, 0, -1),
    (DIR_SE, 1, -1),
];

fn opposite(dir: u8) -> u8 {
    match dir {
        DIR_E => DIR_W,
        DIR_N => DIR_S,
        DIR_NW => DIR_SE,
        DIR_W => DIR_E,
        DIR_S => DIR_N,
        _ => DIR_NW,
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct HexCell {
    ball: Option<usize>,
    mobile: bool,
    needed: u8,
    added: u8,
}

/// Builds a hexagonal mesh on a triangular `(u, v)` lattice.
///
/// Hexagons are placed by their centre in `(w, f)` coordinates. Each ball
/// records the three directions it needs springs in; `finalize` fills any
/// missing neighbour with an anchor and then adds every spring once.
pub struct HexBuilder<'a> {
    mesh: &'a mut PhysicsMesh,
    dimension: i32,
    cells: Vec<HexCell>,
    spacing: f64,
    mass: f64,
    // bounding box of mobile balls
    u1: i32,
    u2: i32,
    v1: i32,
    v2: i32,
}

impl<'a> HexBuilder<'a> {
    pub fn new(mesh: &'a mut PhysicsMesh, dimension: i32, spacing: f64, mass: f64) -> Self {
        let width = (2 * dimension + 1) as usize;
        Self {
            mesh,
            dimension,
            cells: vec![HexCell::default(); width * width],
            spacing,
            mass,
            u1: dimension + 1,
            u2: -(dimension + 1),
            v1: dimension + 1,
            v2: -(dimension + 1),
        }
    }

    fn slot(&self, u: i32, v: i32) -> Result<usize, MeshError> {
        let d = self.dimension;
        if u.abs() > d || v.abs() > d {
            return Err(MeshError::GridOutOfRange { u, v });
        }
        Ok(((u + d) + (2 * d + 1) * (v + d)) as usize)
    }

    /// Cartesian position of lattice point `(u, v)`.
    fn location(&self, u: i32, v: i32) -> PhysicsVector {
        let (u, v) = (f64::from(u), f64::from(v));
        PhysicsVector::new(self.spacing * (u + v / 2.0), self.spacing * (0.75_f64.sqrt() * v), 0.0)
    }

    pub fn add_hexagon(&mut self, w: i32, f: i32) -> Result<(), MeshError> {
        let u = f + w;
        let v = f - 2 * w;
        self.add_ball(u + 1, v, DIR_E | DIR_NW | DIR_S)?;
        self.add_ball(u, v + 1, DIR_N | DIR_W | DIR_SE)?;
        self.add_ball(u - 1, v + 1, DIR_E | DIR_NW | DIR_S)?;
        self.add_ball(u - 1, v, DIR_N | DIR_W | DIR_SE)?;
        self.add_ball(u, v - 1, DIR_E | DIR_NW | DIR_S)?;
        self.add_ball(u + 1, v - 1, DIR_N | DIR_W | DIR_SE)?;
        Ok(())
    }

    fn add_ball(&mut self, u: i32, v: i32, needed: u8) -> Result<(), MeshError> {
        let s = self.slot(u, v)?;
        if self.cells[s].ball.is_some() {
            return Ok(());
        }
        let ball = Ball::new(self.mass, self.location(u, v));
        let index = self.mesh.add_ball(ball);
        self.cells[s] = HexCell { ball: Some(index), mobile: true, needed, added: 0 };
        self.u1 = self.u1.min(u);
        self.u2 = self.u2.max(u);
        self.v1 = self.v1.min(v);
        self.v2 = self.v2.max(v);
        Ok(())
    }

    /// Add the anchor frame and all springs.
    pub fn finalize(&mut self) -> Result<(), MeshError> {
        self.add_frame()?;
        self.add_springs()
    }

    fn mobile_cells(&self) -> Vec<(i32, i32)> {
        let mut found = Vec::new();
        for u in self.u1..=self.u2 {
            for v in self.v1..=self.v2 {
                if let Ok(s) = self.slot(u, v) {
                    if self.cells[s].mobile {
                        found.push((u, v));
                    }
                }
            }
        }
        found
    }

    fn add_frame(&mut self) -> Result<(), MeshError> {
        for (u, v) in self.mobile_cells() {
            let first = self.cells[self.slot(u, v)?];
            for &(dir, du, dv) in &DIRECTIONS {
                if first.needed & dir == 0 {
                    continue;
                }
                let s2 = self.slot(u + du, v + dv)?;
                if self.cells[s2].ball.is_none() {
                    let anchor = Ball::anchor(self.location(u + du, v + dv));
                    let index = self.mesh.add_ball(anchor);
                    let cell = &mut self.cells[s2];
                    cell.ball = Some(index);
                    cell.needed |= opposite(dir);
                    cell.added = 0;
                }
            }
        }
        Ok(())
    }

    fn add_springs(&mut self) -> Result<(), MeshError> {
        for (u, v) in self.mobile_cells() {
            let s1 = self.slot(u, v)?;
            for &(dir, du, dv) in &DIRECTIONS {
                let first = self.cells[s1];
                let missing = first.needed & !first.added;
                if missing & dir == 0 {
                    continue;
                }
                let (u2, v2) = (u + du, v + dv);
                let s2 = self.slot(u2, v2)?;
                let (Some(a), Some(b)) = (first.ball, self.cells[s2].ball) else {
                    return Err(MeshError::EmptyGridCell { u: u2, v: v2 });
                };
                self.mesh.add_spring(Spring::new(a, b))?;
                self.cells[s1].added |= dir;
                self.cells[s2].added |= opposite(dir);
            }
        }
        Ok(())
    }

    /// Index of the ball at offset `(du, dv)` from hexagon centre `(w, f)`.
    pub fn ball_index(&self, w: i32, f: i32, du: i32, dv: i32) -> Result<usize, MeshError> {
        let u = f + w + du;
        let v = f - 2 * w + dv;
        self.cells[self.slot(u, v)?].ball.ok_or(MeshError::EmptyGridCell { u, v })
    }
}

pub fn create_hex(mesh: &mut PhysicsMesh) -> Result<MeshAudioParameters, MeshError> {
    const HEX_WIDE: i32 = 2;
    const HEX_FAR: i32 = 3;
    let response = 4.0e4;

    mesh.clear();
    let mut builder = HexBuilder::new(mesh, 10, MESH_DEFAULT_REST_LENGTH, MOBILE_MASS);
    for w in 0..HEX_WIDE {
        for f in 0..HEX_FAR {
            builder.add_hexagon(w, f)?;
        }
    }
    builder.finalize()?;

    let mut mp = MeshAudioParameters::with_taps(
        builder.ball_index(-1, 0, -1, 0)?,
        builder.ball_index(2, 2, 1, 0)?,
        builder.ball_index(0, 2, -1, 1)?,
        builder.ball_index(1, 0, 1, -1)?,
    );
    mp.left_output_dir1 = PhysicsVector::new(0.0, 0.0, response);
    mp.left_output_dir2 = PhysicsVector::new(0.0, -response, 0.0);
    mp.right_output_dir1 = PhysicsVector::new(0.0, 0.0, response);
    mp.right_output_dir2 = PhysicsVector::new(0.0, response, 0.0);
    Ok(mp)
}

// ------------------------------------ Elastika -----------------------------------

const ELASTIKA_MOBILE: [(f64, f64); 22] = [
    (0.001, 0.0),
    (0.0005, 0.000_866_025_5),
    (-0.0005, 0.000_866_025_5),
    (-0.001, 0.0),
    (-0.0005, -0.000_866_025_5),
    (0.0005, -0.000_866_025_5),
    (0.0025, 0.000_866_025_5),
    (0.002, 0.001_732_051),
    (0.001, 0.001_732_051),
    (0.002, 0.0),
    (0.004, 0.001_732_051),
    (0.0035, 0.002_598_076),
    (0.0025, 0.002_598_076),
    (0.0035, 0.000_866_025_5),
    (0.001, -0.001_732_051),
    (-0.001, -0.001_732_051),
    (-0.0005, -0.002_598_076),
    (0.0005, -0.002_598_076),
    (0.0025, -0.000_866_025_5),
    (0.002, -0.001_732_051),
    (0.004, 0.0),
    (0.0035, -0.000_866_025_5),
];

const ELASTIKA_ANCHORS: [(f64, f64); 12] = [
    (-0.002, 0.0),
    (-0.001, 0.001_732_051),
    (-0.002, -0.001_732_051),
    (0.0005, 0.002_598_076),
    (-0.001, -0.003_464_102),
    (0.002, 0.003_464_102),
    (0.001, -0.003_464_102),
    (0.004, 0.003_464_102),
    (0.0025, -0.002_598_076),
    (0.005, 0.001_732_051),
    (0.004, -0.001_732_051),
    (0.005, 0.0),
];

const ELASTIKA_SPRINGS: [(usize, usize); 39] = [
    (3, 2), (3, 22), (3, 4), (2, 1), (2, 23), (15, 4), (15, 24), (15, 16),
    (4, 5), (1, 8), (1, 0), (8, 7), (8, 25), (16, 17), (16, 26), (5, 0),
    (5, 14), (0, 9), (7, 12), (7, 6), (12, 11), (12, 27), (17, 14), (17, 28),
    (14, 19), (9, 6), (9, 18), (6, 13), (11, 29), (11, 10), (19, 18), (19, 30),
    (18, 21), (13, 10), (13, 20), (10, 31), (21, 20), (21, 32), (20, 33),
];

pub fn elastika_mesh(mesh: &mut PhysicsMesh) -> Result<MeshAudioParameters, MeshError> {
    mesh.clear();
    for &(x, y) in &ELASTIKA_MOBILE {
        mesh.add_ball(Ball::new(MOBILE_MASS, PhysicsVector::new(x, y, 0.0)));
    }
    for &(x, y) in &ELASTIKA_ANCHORS {
        mesh.add_ball(Ball::anchor(PhysicsVector::new(x, y, 0.0)));
    }
    for &(a, b) in &ELASTIKA_SPRINGS {
        mesh.add_spring(Spring::new(a, b))?;
    }

    let mut mp = MeshAudioParameters::with_taps(23, 32, 12, 17);
    mp.left_var_mass = Some(6);
    mp.right_var_mass = Some(5);
    mesh.check_audio_parameters(&mp)?;
    Ok(mp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn degree(mesh: &PhysicsMesh, index: usize) -> usize {
        mesh.springs()
            .iter()
            .filter(|s| s.ball_index1 == index || s.ball_index2 == index)
            .count()
    }

    fn mobile_count(mesh: &PhysicsMesh) -> usize {
        mesh.balls().iter().filter(|b| b.is_mobile()).count()
    }

    #[test]
    fn string_layout() {
        let mut mesh = PhysicsMesh::new();
        let mp = create_string(&mut mesh).unwrap();
        assert_eq!(mesh.num_balls(), 32);
        assert_eq!(mesh.num_springs(), 31);
        assert!(mesh.ball(0).unwrap().is_anchor());
        assert!(mesh.ball(31).unwrap().is_anchor());
        assert_eq!(mobile_count(&mesh), 30);
        assert_eq!((mp.left_input, mp.right_input, mp.left_output, mp.right_output), (3, 6, 27, 24));
    }

    #[test]
    fn drum_is_a_disc_framed_by_anchors() {
        let mut mesh = PhysicsMesh::new();
        let mp = create_round_drum(&mut mesh).unwrap();
        assert_eq!(mobile_count(&mesh), 29);
        // every mobile lattice point has four neighbours
        for (i, b) in mesh.balls().iter().enumerate() {
            if b.is_mobile() {
                assert_eq!(degree(&mesh, i), 4, "ball {i}");
            }
        }
        for index in mp.ball_indices() {
            assert!(mesh.ball(index).unwrap().is_mobile());
        }
    }

    #[test]
    fn hex_has_three_springs_per_mobile_ball() {
        let mut mesh = PhysicsMesh::new();
        let mp = create_hex(&mut mesh).unwrap();
        for (i, b) in mesh.balls().iter().enumerate() {
            if b.is_mobile() {
                assert_eq!(degree(&mesh, i), 3, "ball {i}");
            }
        }
        assert!(mesh.ball(mp.left_input).unwrap().is_anchor());
        assert!(mesh.ball(mp.right_input).unwrap().is_anchor());
        assert!(mesh.ball(mp.left_output).unwrap().is_mobile());
        assert!(mesh.ball(mp.right_output).unwrap().is_mobile());
    }

    #[test]
    fn hex_springs_are_at_rest_length() {
        let mut mesh = PhysicsMesh::new();
        create_hex(&mut mesh).unwrap();
        for s in mesh.springs() {
            let d = mesh.ball(s.ball_index1).unwrap().pos - mesh.ball(s.ball_index2).unwrap().pos;
            assert!((d.magnitude() - MESH_DEFAULT_REST_LENGTH).abs() < 1e-9, "{s:?}");
        }
    }

    #[test]
    fn elastika_layout() {
        let mut mesh = PhysicsMesh::new();
        let mp = elastika_mesh(&mut mesh).unwrap();
        assert_eq!(mesh.num_balls(), 34);
        assert_eq!(mesh.num_springs(), 39);
        assert_eq!(mobile_count(&mesh), 22);
        assert_eq!((mp.left_var_mass, mp.right_var_mass), (Some(6), Some(5)));
        assert!(mesh.ball(mp.left_input).unwrap().is_anchor());
        assert!(mesh.ball(mp.left_output).unwrap().is_mobile());
    }

    #[test_case(create_string ; "string")]
    #[test_case(create_round_drum ; "drum")]
    #[test_case(create_hex ; "hex")]
    #[test_case(elastika_mesh ; "elastika")]
    fn builders_replace_previous_contents(build: fn(&mut PhysicsMesh) -> Result<MeshAudioParameters, MeshError>) {
        let mut mesh = PhysicsMesh::new();
        build(&mut mesh).unwrap();
        let (balls, springs) = (mesh.num_balls(), mesh.num_springs());
        build(&mut mesh).unwrap();
        assert_eq!((mesh.num_balls(), mesh.num_springs()), (balls, springs));
    }
}
