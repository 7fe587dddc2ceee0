pub(crate) mod cfg;
