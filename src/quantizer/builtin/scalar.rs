use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Codec;

/// 8 位标量量化，每一维按训练集上的最小值和最大值线性映射到 0 ~ 255
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarCodec {
    d: usize,
    vmin: Vec<f32>,
    vdiff: Vec<f32>,
}

impl ScalarCodec {
    pub fn new(d: usize) -> Self {
        Self { d, vmin: vec![], vdiff: vec![] }
    }
}

impl Codec for ScalarCodec {
    fn code_size(&self) -> usize {
        self.d
    }

    fn is_trained(&self) -> bool {
        self.vmin.len() == self.d
    }

    fn train(&mut self, x: &[f32]) -> Result<()> {
        let d = self.d;
        let mut vmin = vec![f32::INFINITY; d];
        let mut vmax = vec![f32::NEG_INFINITY; d];
        for v in x.chunks_exact(d) {
            for j in 0..d {
                vmin[j] = vmin[j].min(v[j]);
                vmax[j] = vmax[j].max(v[j]);
            }
        }
        self.vdiff = vmax.iter().zip(&vmin).map(|(max, min)| max - min).collect();
        self.vmin = vmin;
        Ok(())
    }

    fn encode(&self, v: &[f32], code: &mut [u8]) {
        for j in 0..self.d {
            let t = match self.vdiff[j] > 0.0 {
                true => (v[j] - self.vmin[j]) / self.vdiff[j],
                false => 0.0,
            };
            code[j] = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }

    fn decode(&self, code: &[u8], v: &mut [f32]) {
        for j in 0..self.d {
            v[j] = self.vmin[j] + code[j] as f32 / 255.0 * self.vdiff[j];
        }
    }
}
