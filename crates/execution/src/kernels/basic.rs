use dfq_common::{KernelId, Result};

use crate::compute::SharedCompute;
use crate::context::ExecutionContext;
use crate::kernel::{Kernel, KernelBase, KernelKind, KernelStatus};

/// Evaluates a projection expression on each input batch.
pub struct ProjectionKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl ProjectionKernel {
    /// Create a projection kernel.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::Projection, expression, context),
            compute,
        }
    }
}

impl Kernel for ProjectionKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            let projected = self.compute.project(self.expression(), &batch)?;
            self.base.note_output(&projected);
            output.push(projected)?;
        }
        Ok(KernelStatus::Finished)
    }
}

/// Drops rows failing the predicate carried by the expression.
pub struct FilterKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl FilterKernel {
    /// Create a filter kernel.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::Filter, expression, context),
            compute,
        }
    }
}

impl Kernel for FilterKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            let kept = self.compute.filter(self.expression(), &batch)?;
            if kept.num_rows() == 0 {
                continue;
            }
            self.base.note_output(&kept);
            output.push(kept)?;
        }
        Ok(KernelStatus::Finished)
    }
}

/// Emits at most N rows, then stops without draining upstream.
///
/// A limit without a row bound (a sort pipeline head whose expression
/// carried no `fetch`) passes batches through untouched.
pub struct LimitKernel {
    base: KernelBase,
    rows: Option<u64>,
}

impl LimitKernel {
    /// Create a limit kernel emitting at most `rows` rows; `None` means
    /// unbounded pass-through.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        rows: Option<u64>,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::Limit, expression, context),
            rows,
        }
    }
}

impl Kernel for LimitKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        let mut remaining = self.rows;
        loop {
            if remaining == Some(0) {
                // The limit is satisfied; the runtime closes the input so
                // upstream producers drain.
                return Ok(KernelStatus::Stopped);
            }
            let Some(batch) = input.pull()? else {
                return Ok(KernelStatus::Finished);
            };
            self.base.note_input(&batch);
            let emitted = match remaining {
                None => batch,
                Some(r) => {
                    let take = r.min(batch.num_rows() as u64);
                    remaining = Some(r - take);
                    if take < batch.num_rows() as u64 {
                        batch.slice(0, take as usize)
                    } else {
                        batch
                    }
                }
            };
            self.base.note_output(&emitted);
            output.push(emitted)?;
        }
    }
}

/// Concatenates all inputs into the output, one input port at a time.
pub struct UnionKernel {
    base: KernelBase,
}

impl UnionKernel {
    /// Create a union kernel.
    pub fn new(id: KernelId, expression: String, context: &ExecutionContext) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::Union, expression, context),
        }
    }
}

impl Kernel for UnionKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    // Draining one input to completion defers the others, so bounded input
    // edges could stall their producers.
    fn can_throttle_inputs(&self) -> bool {
        false
    }

    fn run(&self) -> Result<KernelStatus> {
        let output = self.output_port("output")?;
        for name in self.base.inputs().names() {
            let input = self.input_port(&name)?;
            while let Some(batch) = input.pull()? {
                self.base.note_input(&batch);
                self.base.note_output(&batch);
                output.push(batch)?;
            }
        }
        Ok(KernelStatus::Finished)
    }
}
