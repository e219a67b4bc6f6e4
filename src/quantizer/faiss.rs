use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

use anyhow::{Result, bail, ensure};
use faiss_sys::*;
use ndarray::ArrayView2;

use crate::quantizer::{Metric, Quantizer};

/// 基于 faiss `index_factory` 的量化器，描述字符串直接交给 faiss 解析
#[derive(Debug)]
pub struct FaissQuantizer {
    index: *mut FaissIndex,
    description: String,
}

unsafe impl Send for FaissQuantizer {}
unsafe impl Sync for FaissQuantizer {}

impl FaissQuantizer {
    fn code_size(&self) -> Option<usize> {
        let mut size = 0;
        unsafe {
            // IVF 类索引的编码存放在倒排表中，不是扁平存储
            if !faiss_IndexIVF_cast(self.index).is_null() {
                return None;
            }
            faiss_try(faiss_Index_sa_code_size(self.index, &mut size)).ok()?;
        }
        (size > 0).then_some(size)
    }
}

impl Drop for FaissQuantizer {
    fn drop(&mut self) {
        unsafe { faiss_Index_free(self.index) }
    }
}

impl Quantizer for FaissQuantizer {
    fn create(d: usize, description: &str, metric: Metric) -> Result<Self> {
        let mut index = ptr::null_mut();
        let cdesc = CString::new(description)?;
        let metric = match metric {
            Metric::InnerProduct => 0,
            Metric::L2 => 1,
            Metric::Cosine => {
                bail!("faiss quantizers do not support the cosine metric, normalize the data and use ip")
            }
        };
        unsafe {
            faiss_try(faiss_index_factory(&mut index, d as i32, cdesc.as_ptr(), metric))?;
        }
        Ok(Self { index, description: description.to_string() })
    }

    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut index = ptr::null_mut();
        let path = path.as_ref();
        let cpath = CString::new(path.to_string_lossy().as_bytes())?;
        unsafe {
            faiss_try(faiss_read_index_fname(cpath.as_ptr(), 0, &mut index))?;
        }
        Ok(Self { index, description: String::new() })
    }

    fn is_sequential_kind(description: &str) -> bool {
        description.to_ascii_lowercase().contains("qinco")
    }

    fn dim(&self) -> usize {
        unsafe { faiss_Index_d(self.index) as usize }
    }

    fn metric(&self) -> Metric {
        match unsafe { faiss_Index_metric_type(self.index) } {
            0 => Metric::InnerProduct,
            _ => Metric::L2,
        }
    }

    fn is_trained(&self) -> bool {
        unsafe { faiss_Index_is_trained(self.index) != 0 }
    }

    fn ntotal(&self) -> usize {
        unsafe { faiss_Index_ntotal(self.index) as usize }
    }

    fn train(&mut self, x: ArrayView2<'_, f32>) -> Result<()> {
        ensure!(x.ncols() == self.dim(), "expected {} columns, got {}", self.dim(), x.ncols());
        let x = x.as_standard_layout();
        unsafe {
            faiss_try(faiss_Index_train(self.index, x.nrows() as i64, x.as_ptr()))?;
        }
        Ok(())
    }

    fn add(&mut self, x: ArrayView2<'_, f32>) -> Result<()> {
        ensure!(x.ncols() == self.dim(), "expected {} columns, got {}", self.dim(), x.ncols());
        let x = x.as_standard_layout();
        unsafe {
            faiss_try(faiss_Index_add(self.index, x.nrows() as i64, x.as_ptr()))?;
        }
        Ok(())
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let cpath = CString::new(path.to_string_lossy().as_bytes())?;
        unsafe {
            faiss_try(faiss_write_index_fname(self.index, cpath.as_ptr()))?;
        }
        Ok(())
    }

    fn flat_code_size(&self) -> Option<usize> {
        self.code_size()
    }

    fn sequential_encoding(&self) -> bool {
        Self::is_sequential_kind(&self.description)
    }

    // C API 没有暴露 PQ 的聚类参数，faiss 会按 ksub * 256 自行下采样
    fn has_fixed_training_budget(&self) -> bool {
        true
    }
}

fn faiss_try(code: std::os::raw::c_int) -> Result<()> {
    if code != 0 {
        unsafe {
            let err = faiss_get_last_error();
            assert!(!err.is_null());
            let cstr = CStr::from_ptr(err);
            bail!("faiss error {}: {}", code, cstr.to_string_lossy());
        }
    }
    Ok(())
}
