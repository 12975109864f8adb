//! ONNX graph loading and the YuNet face detector graph.
//!
//! Graphs are loaded with `tract-onnx`. Loading first tries the fully optimized
//! plan and falls back to the decluttered (unoptimized) plan when optimization
//! fails, which keeps exotic exports usable at roughly half the speed.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

use crate::preprocess::InputSize;

pub(crate) type RunnableModel =
    SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Load a runnable plan for the ONNX graph at `path`.
///
/// `label` names the graph in log messages and errors.
pub(crate) fn load_onnx_graph(path: &Path, label: &str) -> Result<RunnableModel> {
    anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

    match build_plan(path, true) {
        Ok(plan) => {
            debug!("{label} graph {} optimized", path.display());
            Ok(plan)
        }
        Err(opt_err) => {
            warn!(
                "{label} graph {} failed optimized load ({opt_err:#}); using decluttered graph",
                path.display()
            );
            build_plan(path, false).with_context(|| {
                format!("fallback to decluttered {label} graph failed after optimize error: {opt_err}")
            })
        }
    }
}

fn build_plan(path: &Path, optimized: bool) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    }
}

/// Run a plan on a single input and collect its outputs as owned tensors.
pub(crate) fn run_graph(plan: &RunnableModel, input: Tensor) -> Result<Vec<Tensor>> {
    let outputs = plan
        .run(tvec![input.into()])
        .map_err(|e| anyhow::anyhow!("graph execution failed: {e}"))?;
    Ok(outputs.into_iter().map(|value| value.into_tensor()).collect())
}

const STRIDES: [usize; 3] = [8, 16, 32];
const HEADS: usize = 4; // cls, obj, bbox, kps
/// Columns of a decoded detection row: bbox (4) + landmarks (10) + score (1).
pub(crate) const DETECTION_COLS: usize = 15;

/// The YuNet face detector graph.
#[derive(Debug)]
pub struct YuNetModel {
    runnable: RunnableModel,
    input_size: InputSize,
}

impl YuNetModel {
    /// Load the YuNet graph; `input_size` must match the resolution it was exported for.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self> {
        let runnable = load_onnx_graph(model_path.as_ref(), "YuNet")?;
        Ok(Self {
            runnable,
            input_size,
        })
    }

    /// Execute YuNet and return a `[N, 15]` tensor of detection rows
    /// `[x, y, w, h, 5 x (lx, ly), score]` in input-resolution coordinates.
    ///
    /// Graphs exported with the post-processing head produce that tensor
    /// directly; raw multi-head exports are decoded here.
    pub fn run(&self, input: Tensor) -> Result<Tensor> {
        let mut tensors = run_graph(&self.runnable, input)?;
        match tensors.len() {
            1 => tensors
                .pop()
                .ok_or_else(|| anyhow::anyhow!("YuNet model produced no outputs")),
            n if n == STRIDES.len() * HEADS => decode_yunet_outputs(&tensors, self.input_size),
            other => anyhow::bail!(
                "unexpected number of YuNet outputs: expected 1 or {}, got {other}",
                STRIDES.len() * HEADS
            ),
        }
    }

    /// The resolution the graph runs at.
    pub fn input_size(&self) -> InputSize {
        self.input_size
    }
}

/// Fuse YuNet's per-stride heads into detection rows.
///
/// Outputs are ordered `cls[8,16,32], obj[8,16,32], bbox[8,16,32], kps[8,16,32]`.
/// Each grid cell yields one row; the score is `sqrt(cls * obj)`.
pub(crate) fn decode_yunet_outputs(outputs: &[Tensor], input_size: InputSize) -> Result<Tensor> {
    anyhow::ensure!(
        outputs.len() == STRIDES.len() * HEADS,
        "YuNet decode expects {} tensors, got {}",
        STRIDES.len() * HEADS,
        outputs.len()
    );
    let padded_w = (input_size.width as usize).div_ceil(32) * 32;
    let padded_h = (input_size.height as usize).div_ceil(32) * 32;

    let mut fused = Vec::new();
    for (level, &stride) in STRIDES.iter().enumerate() {
        let cols = padded_w / stride;
        let rows = padded_h / stride;
        let cells = cols * rows;
        let cls = head_slice(outputs, level, "cls", cells)?;
        let obj = head_slice(outputs, level + STRIDES.len(), "obj", cells)?;
        let bbox = head_slice(outputs, level + STRIDES.len() * 2, "bbox", cells * 4)?;
        let kps = head_slice(outputs, level + STRIDES.len() * 3, "kps", cells * 10)?;
        let stride_f = stride as f32;

        fused.reserve(cells * DETECTION_COLS);
        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
                let score = if score.is_finite() { score } else { 0.0 };

                let b = &bbox[idx * 4..idx * 4 + 4];
                let cx = (col as f32 + b[0]) * stride_f;
                let cy = (row as f32 + b[1]) * stride_f;
                let w = b[2].exp() * stride_f;
                let h = b[3].exp() * stride_f;
                fused.extend_from_slice(&[cx - w / 2.0, cy - h / 2.0, w, h]);

                for point in kps[idx * 10..idx * 10 + 10].chunks_exact(2) {
                    fused.push((point[0] + col as f32) * stride_f);
                    fused.push((point[1] + row as f32) * stride_f);
                }
                fused.push(score);
            }
        }
    }

    let rows = fused.len() / DETECTION_COLS;
    Tensor::from_shape(&[rows, DETECTION_COLS], &fused)
        .map_err(|e| anyhow::anyhow!("failed to build fused YuNet tensor: {e}"))
}

fn head_slice<'a>(outputs: &'a [Tensor], index: usize, name: &str, len: usize) -> Result<&'a [f32]> {
    let slice = outputs[index]
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("{name} output not f32: {e}"))?;
    anyhow::ensure!(
        slice.len() == len,
        "{name} length mismatch: expected {len}, got {}",
        slice.len()
    );
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loading_missing_model_fails() {
        let err = YuNetModel::load("missing.onnx", InputSize::default()).unwrap_err();
        assert!(format!("{err}").contains("model file not found"));
    }

    #[test]
    fn invalid_model_produces_useful_error() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"not a real onnx file")
            .expect("write mock model");

        let err = load_onnx_graph(temp.path(), "test").expect_err("invalid ONNX should fail");
        let message = format!("{err:#}");
        assert!(
            message.contains("failed to parse ONNX"),
            "Unexpected error message: {message}"
        );
    }

    fn constant_heads(input_size: InputSize) -> Vec<Tensor> {
        let mut heads: Vec<Vec<Tensor>> = vec![Vec::new(); HEADS];
        for &stride in STRIDES.iter() {
            let cells = (input_size.width as usize / stride) * (input_size.height as usize / stride);
            heads[0].push(Tensor::from_shape(&[cells], &vec![0.81f32; cells]).unwrap());
            heads[1].push(Tensor::from_shape(&[cells], &vec![1.0f32; cells]).unwrap());
            heads[2].push(Tensor::from_shape(&[cells, 4], &vec![0.0f32; cells * 4]).unwrap());
            heads[3].push(Tensor::from_shape(&[cells, 10], &vec![0.0f32; cells * 10]).unwrap());
        }
        heads.into_iter().flatten().collect()
    }

    #[test]
    fn decodes_multi_head_outputs() {
        let input_size = InputSize::new(64, 64);
        let fused = decode_yunet_outputs(&constant_heads(input_size), input_size).unwrap();
        // 8x8 + 4x4 + 2x2 grid cells
        assert_eq!(fused.shape(), &[84, DETECTION_COLS]);
        let values = fused.as_slice::<f32>().unwrap();
        // first cell of stride 8: center (0, 0), size 8x8
        assert_eq!(&values[0..4], &[-4.0, -4.0, 8.0, 8.0]);
        assert!((values[14] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_wrong_head_count() {
        assert!(decode_yunet_outputs(&[], InputSize::new(64, 64)).is_err());
    }
}
