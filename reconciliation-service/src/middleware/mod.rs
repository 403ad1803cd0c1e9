pub mod company_id;

pub use company_id::CompanyId;
