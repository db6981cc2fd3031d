mod attendance;
mod contact;
mod coupon;
mod format;
mod program;
mod session;
mod wizard_state;

pub use attendance::Attendance;
pub use contact::{Billing, Contact, PaymentMethod};
pub use coupon::{
    AppliedCoupon, AttendanceEligibility, CouponOrigin, CouponRecord, CouponRule, Discount,
    DiscountType,
};
pub use format::Format;
pub use program::{Block, BlockId, CatalogError, Program, ProgramCatalog};
pub use session::SessionRecord;
pub use wizard_state::{Phase, WizardState};
