//! NIfTI-1 volumes (`.nii`, `.nii.gz`).
//!
//! The file stores a RAS affine; loci volumes live in LPS physical space, so
//! the first two affine rows are negated on the way in and out.

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use loci_core::image::Image;
use loci_core::spatial::{Direction, Point, Spacing, Vector};
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// Row-major 3×4 affine mapping voxel indices to RAS millimetres.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    let to_f64 = |row: [f32; 4]| row.map(|v| v as f64);
    if header.sform_code > 0 {
        return [to_f64(header.srow_x), to_f64(header.srow_y), to_f64(header.srow_z)];
    }
    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;
    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c],
        ];
        let scale = [dx, dy, dz * qfac];
        let offset = [header.quatern_x as f64, header.quatern_y as f64, header.quatern_z as f64];
        return std::array::from_fn(|row| {
            [r[row][0] * scale[0], r[row][1] * scale[1], r[row][2] * scale[2], offset[row]]
        });
    }
    [[dx, 0.0, 0.0, 0.0], [0.0, dy, 0.0, 0.0], [0.0, 0.0, dz, 0.0]]
}

/// Split a RAS affine into LPS origin, spacing and direction.
fn geometry_from_affine(affine: [[f64; 4]; 3]) -> (Point<3>, Spacing<3>, Direction<3>) {
    let flip = [-1.0, -1.0, 1.0];
    let linear = Matrix3::from_fn(|r, c| flip[r] * affine[r][c]);
    let origin = Point::new([flip[0] * affine[0][3], flip[1] * affine[1][3], flip[2] * affine[2][3]]);

    let defaults = [Vector3::x(), Vector3::y(), Vector3::z()];
    let mut spacing = [1.0; 3];
    let mut columns = defaults;
    for c in 0..3 {
        let column = linear.column(c).into_owned();
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[c] = norm;
            columns[c] = column / norm;
        }
    }
    (origin, Spacing::new(spacing), Direction(Matrix3::from_columns(&columns)))
}

/// Read a 3-D NIfTI volume.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let (origin, spacing, direction) = geometry_from_affine(header_affine(obj.header()));

    let mut volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    // Trailing singleton axes (e.g. a single time point) are dropped.
    while volume.ndim() > 3 && volume.shape()[volume.ndim() - 1] == 1 {
        let last = volume.ndim() - 1;
        volume = volume.index_axis_move(Axis(last), 0);
    }
    let volume = volume
        .into_dimensionality::<Ix3>()
        .with_context(|| format!("Expected a 3-D volume in {}", path.display()))?;

    // Logical [X, Y, Z] -> [Z, Y, X], iterated in row-major order.
    let zyx = volume.permuted_axes([2, 1, 0]);
    let shape = [zyx.shape()[0], zyx.shape()[1], zyx.shape()[2]];
    let values: Vec<f32> = zyx.iter().copied().collect();
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(shape)), device);

    tracing::debug!(path = %path.display(), ?shape, spacing = ?spacing.to_array(), "loaded volume");
    Ok(Image::new(tensor, origin, spacing, direction))
}

/// Write a volume as NIfTI with an sform carrying its physical frame.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    use nifti::writer::WriterOptions;

    let path = path.as_ref();
    let values = image
        .to_values()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {}", e))?;
    let [nz, ny, nx] = image.shape();
    let array = Array3::from_shape_vec((nz, ny, nx), values)
        .context("Failed to create ndarray")?
        .permuted_axes([2, 1, 0]);

    let spacing = image.spacing();
    let direction = image.direction();
    let origin = image.origin();
    let flip = [-1.0, -1.0, 1.0];
    let row = |r: usize| -> [f32; 4] {
        let scaled = Vector::new([
            direction[(r, 0)] * spacing[0],
            direction[(r, 1)] * spacing[1],
            direction[(r, 2)] * spacing[2],
        ]);
        [
            (flip[r] * scaled[0]) as f32,
            (flip[r] * scaled[1]) as f32,
            (flip[r] * scaled[2]) as f32,
            (flip[r] * origin[r]) as f32,
        ]
    };

    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0];
    header.sform_code = 1;
    header.qform_code = 0;
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.xyzt_units = 2;

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use nifti::writer::WriterOptions;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_nifti_layout() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // Logical shape (X=3, Y=4, Z=5), value = x + 10 y + 100 z.
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let image = read_nifti::<TestBackend, _>(&file_path, &device)?;
        assert_eq!(image.shape(), [5, 4, 3]);
        assert_eq!(image.size(), [3, 4, 5]);

        let values = image.to_values()?;
        // tensor index (z=2, y=1, x=2)
        assert_eq!(values[2 * 12 + 3 + 2], 212.0);
        Ok(())
    }

    #[test]
    fn test_ras_affine_becomes_lps() {
        let affine = [[2.0, 0.0, 0.0, 10.0], [0.0, 3.0, 0.0, 20.0], [0.0, 0.0, 4.0, 30.0]];
        let (origin, spacing, direction) = geometry_from_affine(affine);
        assert_eq!(origin, Point::new([-10.0, -20.0, 30.0]));
        assert_eq!(spacing, Spacing::new([2.0, 3.0, 4.0]));
        assert_eq!(direction[(0, 0)], -1.0);
        assert_eq!(direction[(1, 1)], -1.0);
        assert_eq!(direction[(2, 2)], 1.0);
    }
}
