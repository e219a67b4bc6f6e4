use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::Codec;
use super::kmeans::{KMeansParams, kmeans, nearest};

/// 乘积量化：把向量切成 m 段，每段独立聚类出 2^nbits 个中心
///
/// 每段编码固定占用一个字节。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCodec {
    d: usize,
    m: usize,
    nbits: usize,
    /// 每个子向量的维数
    dsub: usize,
    /// 每个子空间的中心点数量
    ksub: usize,
    /// 聚类中心，大小为 m * ksub * dsub
    centroids: Vec<f32>,
    pub(super) params: KMeansParams,
}

impl ProductCodec {
    pub fn new(d: usize, m: usize, nbits: usize) -> Result<Self> {
        if m == 0 || d % m != 0 {
            bail!("dimension {d} is not a multiple of the number of sub-quantizers {m}");
        }
        if !(1..=8).contains(&nbits) {
            bail!("nbits must be in 1..=8, got {nbits}");
        }
        let ksub = 1 << nbits;
        Ok(Self { d, m, nbits, dsub: d / m, ksub, centroids: vec![], params: Default::default() })
    }

    pub fn ksub(&self) -> usize {
        self.ksub
    }

    fn sub_centroids(&self, q: usize) -> &[f32] {
        let size = self.ksub * self.dsub;
        &self.centroids[q * size..(q + 1) * size]
    }
}

impl Codec for ProductCodec {
    fn code_size(&self) -> usize {
        self.m
    }

    fn is_trained(&self) -> bool {
        self.centroids.len() == self.m * self.ksub * self.dsub
    }

    fn train(&mut self, x: &[f32]) -> Result<()> {
        let (d, dsub) = (self.d, self.dsub);
        let mut centroids = Vec::with_capacity(self.m * self.ksub * dsub);
        for q in 0..self.m {
            let sub: Vec<f32> =
                x.chunks_exact(d).flat_map(|v| &v[q * dsub..(q + 1) * dsub]).copied().collect();
            let params = KMeansParams { seed: self.params.seed + q as u64, ..self.params };
            let state = kmeans(&sub, dsub, self.ksub, &params)?;
            centroids.extend(state.centroids);
        }
        self.centroids = centroids;
        Ok(())
    }

    fn encode(&self, v: &[f32], code: &mut [u8]) {
        let dsub = self.dsub;
        for q in 0..self.m {
            let (i, _) = nearest(self.sub_centroids(q), dsub, &v[q * dsub..(q + 1) * dsub]);
            code[q] = i as u8;
        }
    }

    fn decode(&self, code: &[u8], v: &mut [f32]) {
        let dsub = self.dsub;
        for q in 0..self.m {
            let i = code[q] as usize;
            v[q * dsub..(q + 1) * dsub]
                .copy_from_slice(&self.sub_centroids(q)[i * dsub..(i + 1) * dsub]);
        }
    }
}
