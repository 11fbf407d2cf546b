// Domains - job handlers with business behavior.
//
// Each domain registers its job types through a register_*_jobs function
// called at process start. Infrastructure stays in kernel/.

pub mod maintenance;
pub mod webhooks;

use crate::kernel::jobs::JobRegistry;

/// Register every built-in job type.
pub fn register_builtin_jobs(registry: &mut JobRegistry) {
    webhooks::register_webhook_jobs(registry);
    maintenance::register_maintenance_jobs(registry);
}
