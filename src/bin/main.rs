fn main() {
  brc20_ledger::main()
}
