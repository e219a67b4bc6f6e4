use anyhow::{Result, bail};
use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

/// k-means 训练参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KMeansParams {
    /// 迭代次数
    pub niter: usize,
    /// 每个聚类中心最多使用的训练向量数量，超出时先随机下采样
    pub max_points_per_centroid: usize,
    /// 随机种子
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        // 与 faiss 的 ClusteringParameters 默认值一致
        Self { niter: 25, max_points_per_centroid: 256, seed: 1234 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KMeansState {
    /// 聚类中心，长度为 k * d
    pub centroids: Vec<f32>,
    /// 每个聚类中心包含的向量数量
    pub centroid_frequency: Vec<usize>,
    /// 所有向量到其聚类中心的距离平方和
    pub distsum: f64,
}

#[inline(always)]
pub fn l2_sqr(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// 返回最近的聚类中心编号和距离平方
pub fn nearest(centroids: &[f32], d: usize, v: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (i, c) in centroids.chunks_exact(d).enumerate() {
        let dis = l2_sqr(v, c);
        if dis < best.1 {
            best = (i, dis);
        }
    }
    best
}

pub fn imbalance_factor(hist: &[usize]) -> f32 {
    let (mut tot, mut uf) = (0.0, 0.0);
    for h in hist {
        let h = *h as f32;
        tot += h;
        uf += h.powf(2.0);
    }
    uf * hist.len() as f32 / tot.powf(2.0)
}

/// Lloyd k-means 聚类
///
/// 参数：
/// - x: 输入向量，长度为 n * d
/// - d: 向量维数
/// - k: 聚类中心数量
pub fn kmeans(x: &[f32], d: usize, k: usize, params: &KMeansParams) -> Result<KMeansState> {
    let n = x.len() / d;
    if n < k {
        bail!("number of training points ({n}) should be at least as large as number of clusters ({k})");
    }

    let mut rng = StdRng::seed_from_u64(params.seed);

    // 训练数据过多时随机下采样，控制训练耗时
    let max_points = k.saturating_mul(params.max_points_per_centroid);
    let subsampled;
    let (x, n) = if n > max_points {
        warn!("训练向量过多（{n} > {max_points}），下采样到 {max_points} 条");
        let mut idx = sample(&mut rng, n, max_points).into_vec();
        idx.sort_unstable();
        subsampled = idx.iter().flat_map(|&i| &x[i * d..(i + 1) * d]).copied().collect::<Vec<_>>();
        (subsampled.as_slice(), max_points)
    } else {
        (x, n)
    };

    // 随机选取 k 条不同的向量作为初始聚类中心
    let mut centroids = Vec::with_capacity(k * d);
    for i in sample(&mut rng, n, k) {
        centroids.extend_from_slice(&x[i * d..(i + 1) * d]);
    }

    let mut assignments = vec![usize::MAX; n];
    let mut state = KMeansState::default();

    for iter in 0..params.niter {
        // 分配每个向量到最近的聚类中心
        let mut changed = 0;
        let mut distsum = 0.0;
        for (i, v) in x.chunks_exact(d).enumerate() {
            let (c, dis) = nearest(&centroids, d, v);
            if assignments[i] != c {
                assignments[i] = c;
                changed += 1;
            }
            distsum += dis as f64;
        }

        // 更新聚类中心
        let mut sum = vec![0f64; k * d];
        let mut frequency = vec![0usize; k];
        for (v, &c) in x.chunks_exact(d).zip(&assignments) {
            frequency[c] += 1;
            for (s, &val) in sum[c * d..(c + 1) * d].iter_mut().zip(v) {
                *s += val as f64;
            }
        }
        let mut reseeded = false;
        for c in 0..k {
            if frequency[c] == 0 {
                // 空聚类：重新随机选一条向量作为中心
                reseeded = true;
                let i = sample(&mut rng, n, 1).index(0);
                centroids[c * d..(c + 1) * d].copy_from_slice(&x[i * d..(i + 1) * d]);
                continue;
            }
            let f = frequency[c] as f64;
            for (dst, s) in centroids[c * d..(c + 1) * d].iter_mut().zip(&sum[c * d..(c + 1) * d]) {
                *dst = (s / f) as f32;
            }
        }

        debug!("第 {} 轮 - 距离和：{:.4} | 变化：{}", iter, distsum, changed);
        state.distsum = distsum;
        state.centroid_frequency = frequency;

        // 分配不再变化，则算法收敛
        if changed == 0 && !reseeded {
            break;
        }
    }

    debug!("k-means 完成，不平衡度：{:.2}", imbalance_factor(&state.centroid_frequency));
    state.centroids = centroids;
    Ok(state)
}
