use dfq_common::{KernelId, Result};

use crate::context::ExecutionContext;
use crate::kernel::{Kernel, KernelBase, KernelKind, KernelStatus};
use crate::loader::DataLoader;

/// Produces batches from a data loader against its schema.
pub struct TableScanKernel {
    base: KernelBase,
    loader: Box<dyn DataLoader>,
}

impl TableScanKernel {
    /// Create a scan over a freshly cloned loader handle.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        loader: Box<dyn DataLoader>,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::TableScan, expression, context),
            loader,
        }
    }
}

impl Kernel for TableScanKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let output = self.output_port("output")?;
        for batch in self.loader.load()? {
            let batch = batch?;
            self.base.note_output(&batch);
            output.push(batch)?;
        }
        Ok(KernelStatus::Finished)
    }
}

/// Scan with projection/filter bindings pushed down to the loader.
pub struct BindableTableScanKernel {
    base: KernelBase,
    loader: Box<dyn DataLoader>,
}

impl BindableTableScanKernel {
    /// Create a bindable scan; the expression carries the pushdown bindings.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        loader: Box<dyn DataLoader>,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::BindableTableScan, expression, context),
            loader,
        }
    }
}

impl Kernel for BindableTableScanKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let output = self.output_port("output")?;
        for batch in self.loader.load_with_pushdown(self.expression())? {
            let batch = batch?;
            self.base.note_output(&batch);
            output.push(batch)?;
        }
        Ok(KernelStatus::Finished)
    }
}
