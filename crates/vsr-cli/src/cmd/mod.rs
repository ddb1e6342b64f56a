pub(crate) mod combine;
pub(crate) mod run;
pub(crate) mod split;
