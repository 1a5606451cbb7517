//! Lenient OBJ parser producing de-duplicated indexed vertex arrays.
//!
//! Supports `v`, `vn` and `f` directives (`vt` is parsed and ignored; faces
//! may reference it). Faces of any arity are fan-triangulated. A single
//! corrupt face never fails the whole load: malformed face tokens are
//! skipped, faces with fewer than three resolvable corners are dropped, and
//! out-of-range references fall back to defaults. Only an unreadable source
//! or a parse yielding zero triangles is an error.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use thiserror::Error;

use crate::mesh::MeshBuffers;

/// Fractional-progress callback, called with values in [0,1]. Must be `Sync`
/// because the parser runs on a worker thread while the UI reads progress.
pub type ProgressSink<'a> = &'a (dyn Fn(f32) + Sync);

/// Progress is reported at most once per this many input bytes.
const PROGRESS_GRANULARITY_BYTES: u64 = 4096;

/// Fallback normal for corners with no resolvable `vn` reference.
const DEFAULT_NORMAL: [f32; 3] = [0.0, 0.0, 1.0];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("i/o error reading mesh source: {0}")]
    Io(#[from] io::Error),
    #[error("mesh contained no usable triangles")]
    NoGeometry,
    #[error("mesh has too many unique vertices for 32-bit indices")]
    TooManyVertices,
}

/// Load an OBJ mesh from a file path, reporting progress by bytes consumed.
pub fn load_obj_from_path(
    path: impl AsRef<Path>,
    progress: Option<ProgressSink>,
) -> Result<MeshBuffers, ParseError> {
    let file = File::open(&path)?;
    let total_bytes = file.metadata().ok().map(|m| m.len());
    parse_obj(BufReader::new(file), total_bytes, progress)
}

/// Load an OBJ mesh from any [`BufRead`] source. `total_bytes`, when known,
/// scales the progress reports; without it only the final 1.0 is reported.
pub fn load_obj_from_reader<R: BufRead>(
    reader: R,
    total_bytes: Option<u64>,
    progress: Option<ProgressSink>,
) -> Result<MeshBuffers, ParseError> {
    parse_obj(reader, total_bytes, progress)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str) -> Result<MeshBuffers, ParseError> {
    parse_obj(
        io::Cursor::new(contents),
        Some(contents.len() as u64),
        None,
    )
}

fn parse_obj<R: BufRead>(
    reader: R,
    total_bytes: Option<u64>,
    progress: Option<ProgressSink>,
) -> Result<MeshBuffers, ParseError> {
    let mut temp_pos: Vec<[f32; 3]> = Vec::new();
    let mut temp_norm: Vec<[f32; 3]> = Vec::new();

    // Dedup key: (position index, normal index or usize::MAX for "none").
    let mut unique: HashMap<(usize, usize), u32> = HashMap::new();
    let mut out = MeshBuffers::default();

    let mut bytes_seen: u64 = 0;
    let mut last_reported: u64 = 0;

    if let Some(sink) = progress {
        sink(0.0);
    }

    for line in reader.lines() {
        let line = line?;
        bytes_seen += line.len() as u64 + 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        match parts.next() {
            Some("v") => temp_pos.push(read_vec3(&mut parts)),
            Some("vn") => temp_norm.push(read_vec3(&mut parts)),
            Some("f") => {
                let corners = resolve_face(parts, temp_pos.len(), temp_norm.len());
                if corners.len() < 3 {
                    continue;
                }
                let mut face_out: Vec<u32> = Vec::with_capacity(corners.len());
                for corner in corners {
                    face_out.push(intern_corner(
                        corner, &temp_pos, &temp_norm, &mut unique, &mut out,
                    )?);
                }
                // Triangulate fan: (0, i-1, i).
                for i in 2..face_out.len() {
                    out.indices.push(face_out[0]);
                    out.indices.push(face_out[i - 1]);
                    out.indices.push(face_out[i]);
                }
            }
            // Ignore other directives (vt/o/g/s/usemtl/mtllib/...).
            _ => {}
        }

        if let (Some(sink), Some(total)) = (progress, total_bytes) {
            if total > 0 && bytes_seen - last_reported >= PROGRESS_GRANULARITY_BYTES {
                sink((bytes_seen as f32 / total as f32).min(1.0));
                last_reported = bytes_seen;
            }
        }
    }

    if out.indices.is_empty() {
        return Err(ParseError::NoGeometry);
    }

    debug_assert!(out.is_valid());
    if let Some(sink) = progress {
        sink(1.0);
    }
    Ok(out)
}

/// One resolved face corner: position index (always valid after clamping)
/// and an optional normal index.
#[derive(Clone, Copy)]
struct Corner {
    pos: usize,
    norm: Option<usize>,
}

fn read_vec3<'a>(parts: &mut impl Iterator<Item = &'a str>) -> [f32; 3] {
    let mut v = [0.0f32; 3];
    for slot in &mut v {
        *slot = parts
            .next()
            .and_then(|t| t.parse::<f32>().ok())
            .unwrap_or(0.0);
    }
    v
}

/// Resolve the vertex tokens of an `f` line. Tokens without a numeric
/// position reference are skipped; a numeric but out-of-range position
/// reference clamps to the first vertex so one bad corner cannot sink the
/// face. Unresolvable normal references become "none" (default normal).
fn resolve_face<'a>(
    parts: impl Iterator<Item = &'a str>,
    pos_count: usize,
    norm_count: usize,
) -> Vec<Corner> {
    let mut corners = Vec::with_capacity(8);
    for token in parts {
        let mut fields = token.split('/');
        let Some(raw) = fields.next().and_then(|f| f.parse::<i64>().ok()) else {
            continue;
        };
        if raw == 0 {
            continue;
        }
        let pos = to_zero_based(raw, pos_count)
            .filter(|&i| i < pos_count)
            .unwrap_or(0);
        let _vt = fields.next(); // texcoords ignored
        let norm = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .and_then(|r| to_zero_based(r, norm_count))
            .filter(|&i| i < norm_count);
        corners.push(Corner { pos, norm });
    }
    corners
}

/// OBJ indices are 1-based; negatives count back from the end of the array.
fn to_zero_based(raw: i64, len: usize) -> Option<usize> {
    match raw {
        0 => None,
        r if r > 0 => Some((r - 1) as usize),
        r => usize::try_from(len as i64 + r).ok(),
    }
}

fn intern_corner(
    corner: Corner,
    temp_pos: &[[f32; 3]],
    temp_norm: &[[f32; 3]],
    unique: &mut HashMap<(usize, usize), u32>,
    out: &mut MeshBuffers,
) -> Result<u32, ParseError> {
    let key = (corner.pos, corner.norm.unwrap_or(usize::MAX));
    if let Some(&idx) = unique.get(&key) {
        return Ok(idx);
    }
    let idx = u32::try_from(out.positions.len()).map_err(|_| ParseError::TooManyVertices)?;
    out.positions
        .push(temp_pos.get(corner.pos).copied().unwrap_or([0.0; 3]));
    out.normals.push(
        corner
            .norm
            .and_then(|n| temp_norm.get(n).copied())
            .unwrap_or(DEFAULT_NORMAL),
    );
    unique.insert(key, idx);
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_triangle() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            f 1//1 2//1 3//1
        "#;
        let mesh = load_obj_from_str(src).expect("parse triangle");
        assert!(mesh.is_valid());
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.normals, vec![[0.0, 0.0, 1.0]; 3]);
    }

    #[test]
    fn shared_corners_deduplicate() {
        // Quad as two triangles sharing two (position, normal) pairs.
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            vn 0 0 1
            f 1//1 2//1 3//1
            f 1//1 3//1 4//1
        "#;
        let mesh = load_obj_from_str(src).expect("parse quad");
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        // Shared corners appear twice in the index list, once in the arrays.
        assert_eq!(mesh.indices.iter().filter(|&&i| i == 0).count(), 2);
        assert_eq!(mesh.indices.iter().filter(|&&i| i == 2).count(), 2);
    }

    #[test]
    fn same_position_different_normal_splits() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            vn 0 0 1
            vn 1 0 0
            f 1//1 2//1 3//1
            f 1//2 2//2 3//2
        "#;
        let mesh = load_obj_from_str(src).expect("parse");
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn polygon_fan_triangulation() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            f 1 2 3 4
        "#;
        let mesh = load_obj_from_str(src).expect("parse quad face");
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn negative_indices_resolve_from_end() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f -3 -2 -1
        "#;
        let mesh = load_obj_from_str(src).expect("parse");
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn missing_normals_default_to_plus_z() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2 3
        "#;
        let mesh = load_obj_from_str(src).expect("parse");
        assert_eq!(mesh.normals, vec![DEFAULT_NORMAL; 3]);
    }

    #[test]
    fn short_faces_are_skipped_not_fatal() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2
            f 1 2 3
        "#;
        let mesh = load_obj_from_str(src).expect("parse");
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn malformed_tokens_are_skipped_within_a_face() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 bogus 2 3
        "#;
        let mesh = load_obj_from_str(src).expect("parse");
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_range_position_clamps_to_first_vertex() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2 99
        "#;
        let mesh = load_obj_from_str(src).expect("parse");
        assert_eq!(mesh.triangle_count(), 1);
        assert!(mesh.is_valid());
    }

    #[test]
    fn no_triangles_is_an_error() {
        let src = r#"
            v 0 0 0
            v 1 0 0
        "#;
        match load_obj_from_str(src) {
            Err(ParseError::NoGeometry) => {}
            other => panic!("expected NoGeometry, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_path_is_an_io_error() {
        let missing = std::env::temp_dir().join("veles3d-definitely-missing.obj");
        match load_obj_from_path(&missing, None) {
            Err(ParseError::Io(_)) => {}
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn progress_is_monotone_and_ends_at_one() {
        // Enough lines to cross several reporting granules.
        let mut src = String::new();
        for i in 0..2000 {
            src.push_str(&format!("v {}.0 0.0 0.0\n", i % 7));
        }
        src.push_str("f 1 2 3\n");

        let seen = parking_lot::Mutex::new(Vec::new());
        let sink = |p: f32| seen.lock().push(p);
        load_obj_from_reader(
            io::Cursor::new(src.as_bytes()),
            Some(src.len() as u64),
            Some(&sink),
        )
        .expect("parse");

        let seen = seen.into_inner();
        assert!(seen.len() > 2, "expected intermediate reports: {seen:?}");
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotone: {seen:?}");
        assert_eq!(*seen.last().unwrap(), 1.0);
    }
}
