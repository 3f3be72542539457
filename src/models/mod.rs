pub mod booking;
pub mod event;
pub mod payment;
pub mod profile;
pub mod slot;
pub mod teacher;
pub mod user;

pub use booking::{Booking, BookingStatus, BookingUpdate, PaymentStatus, PendingBooking};
pub use event::{ClientMessage, SlotEvent};
pub use payment::{CheckoutResult, CreateOrder, PaymentOrder, PaymentReceipt, PaymentVerification};
pub use profile::{ApiAck, Gender, Profile, ProfileDetails, ProfileUpdate};
pub use slot::{Slot, SlotDraft, SlotId, SlotSpan};
pub use teacher::Teacher;
pub use user::{Role, UserIdentity};
