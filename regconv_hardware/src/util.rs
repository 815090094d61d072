use std::time::Duration;

use regconv_traits::Clock;

use crate::error::{HwError, Result};

/// Waits until `condition` becomes true or `timeout` expires, sleeping in `poll_interval`
/// steps rather than busy-spinning. Used by the background configuration thread when
/// polling hardware state that isn't available through `SupervisorIo`'s non-blocking reads
/// (e.g. waiting for a GPIO expander to acknowledge a mode change).
pub fn wait_until_with_timeout(
    mut condition: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    clock: &dyn Clock,
) -> Result<()> {
    let start = clock.now();
    while !condition() {
        if clock.ms_since(start) >= timeout.as_millis() as u64 {
            return Err(HwError::Timeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}
