//! Wizard prompt table
//!
//! Entry `k` (1-based) is the assistant turn recorded after the answer to
//! step `k`; it asks the question for the next step or closes the wizard.

use sopflow_core::WIZARD_STEPS;

const FOLLOW_UPS: [&str; WIZARD_STEPS as usize] = [
    "Who performs this process, and what triggers it?",
    "Walk me through the steps in order, one per line.",
    "What tools, systems or documents are needed along the way?",
    "Which risks, checks or approvals should the procedure call out?",
    "Thanks, that covers everything. Your SOP is ready to generate.",
];

/// Assistant turn recorded after answering `step`
///
/// Steps past the end of the table reuse its last entry; step 0 is treated
/// as step 1.
#[must_use]
pub fn prompt_for(step: u32) -> &'static str {
    let index = step.clamp(1, WIZARD_STEPS) as usize - 1;
    FOLLOW_UPS[index]
}
