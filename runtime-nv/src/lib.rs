//! CUDA driver glue for running generated kernels.
//!
//! Test-harness scope only: one context, one stream, single-grid launches
//! at `(1,1,1)/(1,1,1)`. Every kernel parameter is a device pointer; the
//! fixed order per call is allocate, copy in, launch, synchronize, copy
//! out, free (buffers drop at the end of the call). Each step is checked
//! against the driver status and any failure aborts the host path by
//! propagating [`Error`].

use std::ffi::c_void;

use cust::context::Context;
use cust::memory::{CopyDestination, DeviceBuffer, };
use cust::module::Module;
use cust::stream::{Stream, StreamFlags, };

use log::{debug, info, };

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
  /// The CUDA driver returned a non-success status.
  #[error("cuda driver: {0}")]
  Runtime(#[from] cust::error::CudaError),

  #[error("kernel `{0}` not present in the module")]
  MissingKernel(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A loaded PTX module plus the context and stream it runs on. Dropped
/// together, context last.
pub struct NvExecutor {
  module: Module,
  stream: Stream,
  _ctx: Context,
}

impl NvExecutor {
  /// Initialize the driver on the default device and load `ptx`.
  pub fn new(ptx: &str) -> Result<Self> {
    let ctx = cust::quick_init()?;
    info!("cuda context up, loading {} bytes of PTX", ptx.len());
    let module = Module::from_ptx(ptx, &[])?;
    let stream = Stream::new(StreamFlags::NON_BLOCKING, None)?;
    Ok(NvExecutor {
      module,
      stream,
      _ctx: ctx,
    })
  }

  /// Launch `kernel` once on a `(1,1,1)/(1,1,1)` grid. The output buffer
  /// (`out_words` words, zero-filled) is the kernel's first parameter,
  /// followed by one device buffer per input slice. Returns the output
  /// after synchronizing.
  pub fn run(&self, kernel: &str, out_words: usize, inputs: &[&[u64]])
    -> Result<Vec<u64>>
  {
    let func = self.module.get_function(kernel).map_err(|_| {
      Error::MissingKernel(kernel.into())
    })?;
    debug!("launching `{}` with {} inputs", kernel, inputs.len());

    let out = DeviceBuffer::from_slice(&vec![0u64; out_words])?;
    let mut bufs = Vec::with_capacity(inputs.len());
    for input in inputs {
      bufs.push(DeviceBuffer::from_slice(input)?);
    }

    // The launch ABI wants a pointer to each parameter value, and every
    // parameter is itself a device pointer.
    let mut dev_ptrs = Vec::with_capacity(1 + bufs.len());
    dev_ptrs.push(out.as_device_ptr());
    for b in bufs.iter() {
      dev_ptrs.push(b.as_device_ptr());
    }
    let args: Vec<*mut c_void> = dev_ptrs
      .iter()
      .map(|p| p as *const _ as *mut c_void)
      .collect();

    unsafe {
      self.stream.launch(&func, (1, 1, 1), (1, 1, 1), 0, &args)?;
    }
    self.stream.synchronize()?;

    let mut host = vec![0u64; out_words];
    out.copy_to(&mut host)?;
    Ok(host)
  }
}

#[cfg(test)]
mod tests {
  // Hardware end-to-end coverage lives in tests/device.rs and is ignored
  // by default; nothing here needs a GPU.
}
