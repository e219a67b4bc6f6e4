use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::Codec;
use super::kmeans::{KMeansParams, kmeans, nearest};

/// 残差量化：m 级码本依次量化上一级的残差
///
/// 编码时每一级都依赖上一级的结果，只能逐条串行进行，速度远慢于乘积量化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualCodec {
    d: usize,
    m: usize,
    nbits: usize,
    ksub: usize,
    /// 每一级的码本，大小为 m * ksub * d
    codebooks: Vec<f32>,
    pub(super) params: KMeansParams,
}

impl ResidualCodec {
    pub fn new(d: usize, m: usize, nbits: usize) -> Result<Self> {
        if m == 0 {
            bail!("the number of residual stages must be positive");
        }
        if !(1..=8).contains(&nbits) {
            bail!("nbits must be in 1..=8, got {nbits}");
        }
        Ok(Self { d, m, nbits, ksub: 1 << nbits, codebooks: vec![], params: Default::default() })
    }

    pub fn ksub(&self) -> usize {
        self.ksub
    }

    fn codebook(&self, stage: usize) -> &[f32] {
        let size = self.ksub * self.d;
        &self.codebooks[stage * size..(stage + 1) * size]
    }
}

impl Codec for ResidualCodec {
    fn code_size(&self) -> usize {
        self.m
    }

    fn is_trained(&self) -> bool {
        self.codebooks.len() == self.m * self.ksub * self.d
    }

    fn train(&mut self, x: &[f32]) -> Result<()> {
        let d = self.d;
        let mut residual = x.to_vec();
        self.codebooks.clear();
        for stage in 0..self.m {
            let params = KMeansParams { seed: self.params.seed + stage as u64, ..self.params };
            let state = kmeans(&residual, d, self.ksub, &params)?;
            for r in residual.chunks_exact_mut(d) {
                let (i, _) = nearest(&state.centroids, d, r);
                for (x, c) in r.iter_mut().zip(&state.centroids[i * d..(i + 1) * d]) {
                    *x -= c;
                }
            }
            self.codebooks.extend(state.centroids);
        }
        Ok(())
    }

    fn encode(&self, v: &[f32], code: &mut [u8]) {
        let d = self.d;
        let mut r = v.to_vec();
        for stage in 0..self.m {
            let codebook = self.codebook(stage);
            let (i, _) = nearest(codebook, d, &r);
            for (x, c) in r.iter_mut().zip(&codebook[i * d..(i + 1) * d]) {
                *x -= c;
            }
            code[stage] = i as u8;
        }
    }

    fn decode(&self, code: &[u8], v: &mut [f32]) {
        let d = self.d;
        v.fill(0.0);
        for stage in 0..self.m {
            let i = code[stage] as usize;
            for (x, c) in v.iter_mut().zip(&self.codebook(stage)[i * d..(i + 1) * d]) {
                *x += c;
            }
        }
    }
}
