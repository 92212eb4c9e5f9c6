// Tests module
// Integration: runtime wiring, pricing guide, end-to-end transaction flows
// Concurrency: ledger and gas table invariants under parallel callers
