//! CPU-side geometry generation.
//!
//! Every demo mesh starts as a [`RawGeometry`] built here and is then uploaded
//! with [`RawGeometry::upload`]. Keeping generation on the CPU makes the
//! primitives testable without a device.
//!
//! | Primitive | Used by |
//! |-----------|---------|
//! | [`RawGeometry::icosahedron`] | instanced spheres, the refractive blob |
//! | [`RawGeometry::uv_sphere`] | gradient backdrops |
//! | [`RawGeometry::cube`] | the edge-outline subject |
//! | [`RawGeometry::quad`] | particle billboards |

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Vertex3d};

/// Raw geometry data before GPU upload.
#[derive(Clone, Debug)]
pub struct RawGeometry {
    /// Vertex positions, normals, and UVs.
    pub vertices: Vec<Vertex3d>,
    /// Triangle indices, counter-clockwise when seen from outside.
    pub indices: Vec<u32>,
}

impl RawGeometry {
    /// Creates raw geometry from vertices and indices.
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Computes the axis-aligned bounding box.
    ///
    /// Returns `(min, max)` corners of the bounding box.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    /// Returns the center point of the geometry.
    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounds();
        (min + max) * 0.5
    }

    /// Number of triangles described by the index list.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Upload to GPU buffers.
    pub fn upload(&self, gpu: &GpuContext, label: &str) -> Mesh {
        Mesh::new(gpu, label, &self.vertices, &self.indices)
    }

    /// Subdivided icosahedron projected onto a sphere.
    ///
    /// Each of the 20 faces is split into `(detail + 1)^2` triangles, so
    /// `detail = 0` is the plain icosahedron. Faces do not share vertices,
    /// which keeps per-face UVs free of seams.
    pub fn icosahedron(radius: f32, detail: u32) -> Self {
        let t = (1.0 + 5f32.sqrt()) / 2.0;

        #[rustfmt::skip]
        let corners = [
            Vec3::new(-1.0,  t, 0.0), Vec3::new( 1.0,  t, 0.0),
            Vec3::new(-1.0, -t, 0.0), Vec3::new( 1.0, -t, 0.0),
            Vec3::new(0.0, -1.0,  t), Vec3::new(0.0,  1.0,  t),
            Vec3::new(0.0, -1.0, -t), Vec3::new(0.0,  1.0, -t),
            Vec3::new( t, 0.0, -1.0), Vec3::new( t, 0.0,  1.0),
            Vec3::new(-t, 0.0, -1.0), Vec3::new(-t, 0.0,  1.0),
        ];

        #[rustfmt::skip]
        let faces: [[usize; 3]; 20] = [
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        let cols = detail + 1;
        let per_face = ((cols + 1) * (cols + 2) / 2) as usize;
        let mut vertices = Vec::with_capacity(per_face * faces.len());
        let mut indices = Vec::with_capacity((cols * cols * 3) as usize * faces.len());

        for face in faces {
            let [a, b, c] = face.map(|i| corners[i]);
            let base = vertices.len() as u32;
            let mut row_start = Vec::with_capacity(cols as usize + 1);

            for i in 0..=cols {
                row_start.push(vertices.len() as u32 - base);
                let along = i as f32 / cols as f32;
                let left = a.lerp(c, along);
                let right = b.lerp(c, along);
                let span = cols - i;

                for j in 0..=span {
                    let p = if span == 0 {
                        left
                    } else {
                        left.lerp(right, j as f32 / span as f32)
                    };
                    let normal = p.normalize();
                    vertices.push(Vertex3d::new(
                        (normal * radius).to_array(),
                        normal.to_array(),
                        spherical_uv(normal).to_array(),
                    ));
                }
            }

            for i in 0..cols as usize {
                let span = cols as usize - i;
                let row = base + row_start[i];
                let next = base + row_start[i + 1];
                for j in 0..span as u32 {
                    push_outward(&mut indices, &vertices, [row + j, row + j + 1, next + j]);
                    if (j as usize) + 1 < span {
                        push_outward(
                            &mut indices,
                            &vertices,
                            [row + j + 1, next + j + 1, next + j],
                        );
                    }
                }
            }
        }

        Self::new(vertices, indices)
    }

    /// Latitude/longitude sphere with the UV layout of a classic `SphereGeometry`:
    /// `u` runs around the equator, `v` from the top pole (1) to the bottom (0).
    pub fn uv_sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for iy in 0..=height_segments {
            let v = iy as f32 / height_segments as f32;
            let theta = v * PI;

            for ix in 0..=width_segments {
                let u = ix as f32 / width_segments as f32;
                let phi = u * 2.0 * PI;

                let normal = Vec3::new(
                    -phi.cos() * theta.sin(),
                    theta.cos(),
                    phi.sin() * theta.sin(),
                );
                vertices.push(Vertex3d::new(
                    (normal * radius).to_array(),
                    normal.to_array(),
                    [u, 1.0 - v],
                ));
            }
        }

        let stride = width_segments + 1;
        for iy in 0..height_segments {
            for ix in 0..width_segments {
                let a = iy * stride + ix + 1;
                let b = iy * stride + ix;
                let c = (iy + 1) * stride + ix;
                let d = (iy + 1) * stride + ix + 1;

                if iy != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != height_segments - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }

        Self::new(vertices, indices)
    }

    /// Axis-aligned box centred at the origin with flat per-face normals.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, right, up) in faces {
            let base = vertices.len() as u32;
            for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (normal + right * du + up * dv) * h;
                vertices.push(Vertex3d::new(
                    p.to_array(),
                    normal.to_array(),
                    [(du + 1.0) * 0.5, (dv + 1.0) * 0.5],
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::new(vertices, indices)
    }

    /// Unit quad in the XY plane facing +Z, corners at ±0.5.
    pub fn quad() -> Self {
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex3d::new([-0.5, -0.5, 0.0], normal, [0.0, 0.0]),
            Vertex3d::new([0.5, -0.5, 0.0], normal, [1.0, 0.0]),
            Vertex3d::new([0.5, 0.5, 0.0], normal, [1.0, 1.0]),
            Vertex3d::new([-0.5, 0.5, 0.0], normal, [0.0, 1.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }
}

fn spherical_uv(n: Vec3) -> Vec2 {
    Vec2::new(
        n.z.atan2(-n.x) / (2.0 * PI) + 0.5,
        n.y.clamp(-1.0, 1.0).asin() / PI + 0.5,
    )
}

/// Push a triangle of a convex, origin-centred surface with CCW winding seen from outside.
fn push_outward(indices: &mut Vec<u32>, vertices: &[Vertex3d], tri: [u32; 3]) {
    let [a, b, c] = tri.map(|i| Vec3::from(vertices[i as usize].position));
    let facing = (b - a).cross(c - a).dot(a + b + c);
    if facing >= 0.0 {
        indices.extend_from_slice(&tri);
    } else {
        indices.extend_from_slice(&[tri[0], tri[2], tri[1]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(geom: &RawGeometry) {
        for tri in geom.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(geom.vertices[i as usize].position));
            let n = (b - a).cross(c - a);
            if n.length_squared() > 1e-12 {
                assert!(n.dot(a + b + c) > 0.0, "inward-facing triangle {tri:?}");
            }
        }
    }

    #[test]
    fn raw_geometry_bounds() {
        let vertices = vec![
            Vertex3d::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([-1.0, -1.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        let geom = RawGeometry::new(vertices, vec![0, 1, 2]);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(geom.center(), Vec3::new(0.0, 0.5, 1.0));
    }

    #[test]
    fn icosahedron_detail_zero_is_twenty_faces() {
        let geom = RawGeometry::icosahedron(1.0, 0);
        assert_eq!(geom.triangle_count(), 20);
        assert_eq!(geom.vertices.len(), 60);
    }

    #[test]
    fn icosahedron_subdivision_counts() {
        let detail = 4;
        let geom = RawGeometry::icosahedron(0.3, detail);
        let cols = (detail + 1) as usize;
        assert_eq!(geom.triangle_count(), 20 * cols * cols);
        assert_eq!(geom.vertices.len(), 20 * (cols + 1) * (cols + 2) / 2);
        assert_outward(&geom);
    }

    #[test]
    fn icosahedron_vertices_lie_on_sphere() {
        let geom = RawGeometry::icosahedron(1.5, 3);
        for v in &geom.vertices {
            let r = Vec3::from(v.position).length();
            assert!((r - 1.5).abs() < 1e-4);
            assert!((Vec3::from(v.normal).length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn uv_sphere_uv_range_and_winding() {
        let geom = RawGeometry::uv_sphere(50.0, 16, 16);
        assert_eq!(geom.vertices.len(), 17 * 17);
        for v in &geom.vertices {
            assert!((0.0..=1.0).contains(&v.uv[0]));
            assert!((0.0..=1.0).contains(&v.uv[1]));
        }
        assert_outward(&geom);
    }

    #[test]
    fn cube_is_closed_and_outward() {
        let geom = RawGeometry::cube(1.0);
        assert_eq!(geom.triangle_count(), 12);
        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::splat(-0.5));
        assert_eq!(max, Vec3::splat(0.5));
        assert_outward(&geom);
    }
}
