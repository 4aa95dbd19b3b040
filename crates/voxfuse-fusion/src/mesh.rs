//! Triangle meshes and ASCII PLY export.

use std::io::{self, Write};
use std::path::PathBuf;

use voxfuse_types::{Aabb, Rgb, Vec3};

/// An indexed triangle mesh in world coordinates.
///
/// `normals` is parallel to `positions`; `colors` is either empty or
/// parallel to `positions`. Every three entries of `indices` form one
/// triangle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Rgb>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty() && self.colors.len() == self.positions.len()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.positions)
    }

    /// Triangle vertex positions.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                self.positions[t[0] as usize],
                self.positions[t[1] as usize],
                self.positions[t[2] as usize],
            ]
        })
    }
}

/// Summary of a completed mesh export.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshExportReport {
    pub path: PathBuf,
    pub chunks: usize,
    pub vertices: usize,
    pub triangles: usize,
}

/// Write `meshes` as one ASCII PLY document.
///
/// Vertex colour properties are emitted only when every non-empty mesh
/// carries colours. Returns `(vertices, triangles)` written.
pub fn write_ply<'a, W, I>(meshes: I, out: &mut W) -> io::Result<(usize, usize)>
where
    W: Write,
    I: IntoIterator<Item = &'a Mesh>,
    I::IntoIter: Clone,
{
    let meshes = meshes.into_iter().filter(|m| !m.is_empty());
    let (vertices, triangles) = meshes
        .clone()
        .fold((0, 0), |(v, t), m| (v + m.vertex_count(), t + m.triangle_count()));
    let colored = vertices > 0 && meshes.clone().all(Mesh::has_colors);

    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "comment generated by voxfuse")?;
    writeln!(out, "element vertex {vertices}")?;
    for p in ["x", "y", "z", "nx", "ny", "nz"] {
        writeln!(out, "property float {p}")?;
    }
    if colored {
        for p in ["red", "green", "blue"] {
            writeln!(out, "property uchar {p}")?;
        }
    }
    writeln!(out, "element face {triangles}")?;
    writeln!(out, "property list uchar int vertex_indices")?;
    writeln!(out, "end_header")?;

    for m in meshes.clone() {
        for (i, (p, n)) in m.positions.iter().zip(&m.normals).enumerate() {
            write!(out, "{} {} {} {} {} {}", p.x, p.y, p.z, n.x, n.y, n.z)?;
            if colored {
                let c = m.colors[i];
                write!(out, " {} {} {}", c.r, c.g, c.b)?;
            }
            writeln!(out)?;
        }
    }

    let mut base = 0usize;
    for m in meshes {
        for t in m.indices.chunks_exact(3) {
            writeln!(
                out,
                "3 {} {} {}",
                base + t[0] as usize,
                base + t[1] as usize,
                base + t[2] as usize
            )?;
        }
        base += m.vertex_count();
    }

    Ok((vertices, triangles))
}
