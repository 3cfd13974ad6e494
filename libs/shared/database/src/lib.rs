pub mod memory;
pub mod state;
pub mod store;
pub mod supabase;

pub use memory::MemoryStore;
pub use state::{open_store, AppState};
pub use store::{BookingTransaction, ClinicStore, StoreError};
pub use supabase::{SupabaseClient, SupabaseStore};
