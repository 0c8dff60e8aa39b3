mod protocol;
mod provision;
